//! Collaborators backed by shell commands
//!
//! Each capability is a command template from the configuration file, run
//! through `sh -c` with a timeout. This keeps the harness independent of any
//! particular hypervisor tooling such as virsh.

mod host;
mod shell;
mod sink;

pub use host::LocalHost;
pub use shell::{ShellGuest, ShellSession, ShellVm};
pub use sink::KeyvalFile;

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command as TokioCommand;

use crate::common::{Error, Result};
use crate::guest::CommandOutput;

/// Run a shell command line, bounded by `timeout`
///
/// The child is killed if the timeout expires.
pub async fn run_shell(command: &str, timeout: Duration) -> Result<CommandOutput> {
    tracing::debug!("Running: {}", command);

    let child = TokioCommand::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn '{}': {}", command, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(out)) => {
            let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
            output.push_str(&String::from_utf8_lossy(&out.stderr));
            tracing::debug!("'{}' exited with {:?}", command, out.status.code());
            Ok(CommandOutput {
                status: out.status.code(),
                output,
            })
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => Err(Error::CommandTimeout {
            command: command.to_string(),
            after: timeout,
        }),
    }
}

/// Run a shell command line, failing unless it exits 0
pub async fn run_checked(command: &str, timeout: Duration) -> Result<String> {
    let out = run_shell(command, timeout).await?;
    if out.success() {
        Ok(out.output)
    } else {
        Err(Error::command_failed(command, out.status, &out.output))
    }
}
