//! Common utilities shared by the CLI, backends and scenario cases

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Substitute `{name}` placeholders in a command template.
///
/// Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}

/// First program invoked by a shell command line, if any
///
/// Used to check that configured commands resolve on `PATH`.
pub fn leading_program(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|word| !word.contains('=') && *word != "sudo")
}
