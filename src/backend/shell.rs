//! VM control and guest access through shell command templates

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{run_checked, run_shell};
use crate::common::config::{GuestConfig, VmConfig};
use crate::common::{render_template, Error, Result};
use crate::guest::{crash, CommandOutput, GuestAccess, GuestSession, LoginResult, VmControl};

/// How long a single login probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between login probes
const PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// How long `send_line` waits before leaving the command running
const SEND_LINE_GRACE: Duration = Duration::from_secs(5);

/// VM lifecycle driven by `[vm]` command templates
pub struct ShellVm {
    config: VmConfig,
    command_timeout: Duration,
}

impl ShellVm {
    pub fn new(config: VmConfig, command_timeout: Duration) -> Self {
        Self {
            config,
            command_timeout,
        }
    }

    fn render(&self, template: &str, path: Option<&Path>, cmd: Option<&str>) -> String {
        let path = path.map(|p| p.display().to_string()).unwrap_or_default();
        render_template(
            template,
            &[
                ("vm", self.config.name.as_str()),
                ("path", path.as_str()),
                ("cmd", cmd.unwrap_or_default()),
            ],
        )
    }
}

#[async_trait]
impl VmControl for ShellVm {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn start(&mut self) -> Result<()> {
        let cmd = self.render(&self.config.start, None, None);
        run_checked(&cmd, self.command_timeout).await.map(|_| ())
    }

    async fn pause(&mut self) -> Result<()> {
        let cmd = self.render(&self.config.pause, None, None);
        run_checked(&cmd, self.command_timeout).await.map(|_| ())
    }

    async fn save_state(&mut self, path: &Path) -> Result<()> {
        let cmd = self.render(&self.config.save, Some(path), None);
        run_checked(&cmd, self.command_timeout).await.map(|_| ())
    }

    async fn restore_state(&mut self, path: &Path) -> Result<()> {
        let cmd = self.render(&self.config.restore, Some(path), None);
        run_checked(&cmd, self.command_timeout).await.map(|_| ())
    }

    async fn verify_alive(&mut self) -> Result<()> {
        let cmd = self.render(&self.config.status, None, None);
        let out = run_shell(&cmd, self.command_timeout).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::VmNotAlive(self.config.name.clone()))
        }
    }

    async fn send_monitor_command(&mut self, cmd: &str) -> Result<String> {
        let line = self.render(&self.config.monitor, None, Some(cmd));
        run_checked(&line, self.command_timeout).await
    }
}

/// Guest login driven by `[guest]` command templates
///
/// A failed probe consults the serial console log, if configured. Only the
/// part of the log written since the last successful login is scanned, so a
/// crash that was already recovered from is not reported again.
pub struct ShellGuest {
    vm: String,
    config: GuestConfig,
    console_seen: u64,
}

impl ShellGuest {
    pub fn new(vm: &str, config: GuestConfig) -> Self {
        Self {
            vm: vm.to_string(),
            config,
            console_seen: 0,
        }
    }

    fn console_path(&self) -> Option<PathBuf> {
        let template = self.config.console_log.as_ref()?.display().to_string();
        Some(PathBuf::from(render_template(
            &template,
            &[("vm", self.vm.as_str())],
        )))
    }

    /// Console text written since the last successful login
    async fn fresh_console(&self) -> Option<String> {
        let path = self.console_path()?;
        let bytes = tokio::fs::read(&path).await.ok()?;
        let start = usize::try_from(self.console_seen)
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        Some(String::from_utf8_lossy(&bytes[start..]).into_owned())
    }

    async fn mark_console_seen(&mut self) {
        if let Some(path) = self.console_path() {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                self.console_seen = meta.len();
            }
        }
    }
}

#[async_trait]
impl GuestAccess for ShellGuest {
    async fn wait_for_login(&mut self, timeout: Duration) -> Result<LoginResult> {
        let probe = render_template(&self.config.login_probe, &[("vm", self.vm.as_str())]);
        let started = tokio::time::Instant::now();

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(LoginResult::Timeout);
            }

            let probed = match run_shell(&probe, remaining.min(PROBE_TIMEOUT)).await {
                Ok(out) => out.success(),
                Err(e) if e.is_timeout() => false,
                Err(e) => return Err(e),
            };

            if probed {
                self.mark_console_seen().await;
                return Ok(LoginResult::Success(Box::new(ShellSession::new(
                    &self.vm,
                    &self.config.exec,
                ))));
            }

            if let Some(text) = self.fresh_console().await {
                if crash::count_markers(&text) > 0 {
                    return Ok(LoginResult::CrashDetected(text));
                }
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(remaining.min(PROBE_INTERVAL)).await;
        }
    }
}

/// Guest shell where every command is a fresh `[guest] exec` invocation
pub struct ShellSession {
    vm: String,
    exec: String,
}

impl ShellSession {
    pub fn new(vm: &str, exec: &str) -> Self {
        Self {
            vm: vm.to_string(),
            exec: exec.to_string(),
        }
    }

    fn render(&self, cmd: &str) -> String {
        render_template(&self.exec, &[("vm", self.vm.as_str()), ("cmd", cmd)])
    }
}

#[async_trait]
impl GuestSession for ShellSession {
    async fn cmd_output(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        run_shell(&self.render(cmd), timeout).await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        // The line may take the guest down with it, so a hang is expected
        match run_shell(&self.render(line), SEND_LINE_GRACE).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_timeout() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
