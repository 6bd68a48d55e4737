//! Guest VM collaborator contracts
//!
//! The harness never speaks a hypervisor or guest protocol itself. Scenario
//! steps drive the VM, the guest and the host through the capability traits
//! below; [`crate::backend`] provides implementations driven by shell command
//! templates.

pub mod clock;
pub mod crash;
pub mod login;
pub mod ntp;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::scenario::StepError;

pub use clock::{Clock, ManualClock, TokioClock};
pub use login::{login_once, poll_login, LoginPolicy};

/// VM lifecycle control
#[async_trait]
pub trait VmControl: Send + Sync {
    /// Name of the VM, for log messages
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    /// Save the full VM state to `path`; the VM is stopped afterwards
    async fn save_state(&mut self, path: &Path) -> Result<()>;

    /// Bring the VM back from a state file written by `save_state`
    async fn restore_state(&mut self, path: &Path) -> Result<()>;

    /// Fails with [`Error::VmNotAlive`] if the VM process is gone
    async fn verify_alive(&mut self) -> Result<()>;

    /// Send a human monitor command and return its output
    async fn send_monitor_command(&mut self, cmd: &str) -> Result<String>;
}

/// Result of a login attempt
pub enum LoginResult {
    Success(Box<dyn GuestSession>),
    Timeout,
    /// The guest kernel crashed; carries the collected console text
    CrashDetected(String),
}

impl fmt::Debug for LoginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => write!(f, "Success"),
            Self::Timeout => write!(f, "Timeout"),
            Self::CrashDetected(text) => f.debug_tuple("CrashDetected").field(text).finish(),
        }
    }
}

/// Access to the guest OS login
#[async_trait]
pub trait GuestAccess: Send + Sync {
    /// Wait up to `timeout` for the guest to accept a login
    async fn wait_for_login(&mut self, timeout: Duration) -> Result<LoginResult>;
}

/// Output of a command run in the guest or on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, `None` if killed by a signal
    pub status: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// A logged-in guest shell
#[async_trait]
pub trait GuestSession: Send + Sync {
    /// Run `cmd` and return its output whatever the exit status
    async fn cmd_output(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Send a line without waiting for the command to finish
    async fn send_line(&mut self, line: &str) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Run `cmd`, failing unless it exits 0
    async fn cmd(&mut self, cmd: &str, timeout: Duration) -> Result<String> {
        let out = self.cmd_output(cmd, timeout).await?;
        if out.success() {
            Ok(out.output)
        } else {
            Err(Error::command_failed(cmd, out.status, &out.output))
        }
    }
}

/// Host-side operations
#[async_trait]
pub trait Host: Send + Sync {
    async fn run(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Flush the host page cache so a restore reads from disk
    async fn drop_caches(&mut self) -> Result<()>;

    /// Fails on a missing or locked file
    async fn remove_file(&mut self, path: &Path) -> Result<()>;
}

/// Destination for result key/values
pub trait ResultSink: Send + Sync {
    fn write_keyval(&mut self, values: &BTreeMap<String, String>) -> Result<()>;
}

/// Collaborators handed to every guest scenario step
pub struct GuestEnv {
    pub vm: Box<dyn VmControl>,
    pub guest: Box<dyn GuestAccess>,
    pub host: Box<dyn Host>,
    pub clock: Arc<dyn Clock>,
    pub sink: Box<dyn ResultSink>,
    /// Current login session, replaced after every (re)login
    pub session: Option<Box<dyn GuestSession>>,
}

impl GuestEnv {
    /// The active session, or an error if no step has logged in yet
    pub fn session(&mut self) -> std::result::Result<&mut Box<dyn GuestSession>, StepError> {
        self.session
            .as_mut()
            .ok_or_else(|| StepError::Internal("No guest session; log in first".to_string()))
    }

    /// Close the active session, if any
    pub async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!("Closing guest session failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            status: Some(0),
            output: String::new(),
        };
        let killed = CommandOutput {
            status: None,
            output: String::new(),
        };
        assert!(ok.success());
        assert!(!killed.success());
    }

    #[test]
    fn test_login_result_debug_hides_session() {
        let crash = LoginResult::CrashDetected("BUG: x".into());
        assert_eq!(format!("{:?}", crash), "CrashDetected(\"BUG: x\")");
        assert_eq!(format!("{:?}", LoginResult::Timeout), "Timeout");
    }
}
