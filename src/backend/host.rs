//! The local host the harness runs on

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::{run_checked, run_shell};
use crate::common::config::HostConfig;
use crate::common::{Error, Result};
use crate::guest::{CommandOutput, Host};

/// Host operations run directly on this machine
pub struct LocalHost {
    config: HostConfig,
    command_timeout: Duration,
}

impl LocalHost {
    pub fn new(config: HostConfig, command_timeout: Duration) -> Self {
        Self {
            config,
            command_timeout,
        }
    }
}

#[async_trait]
impl Host for LocalHost {
    async fn run(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        run_shell(cmd, timeout).await
    }

    async fn drop_caches(&mut self) -> Result<()> {
        run_checked(&self.config.drop_caches, self.command_timeout)
            .await
            .map(|_| ())
    }

    async fn remove_file(&mut self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| Error::FileRemove {
                path: path.display().to_string(),
                error: e.to_string(),
            })
    }
}
