//! Configuration file handling
//!
//! The backend configuration maps every VM and guest capability onto a shell
//! command template. Placeholders `{vm}`, `{path}` and `{cmd}` are substituted
//! before the command is handed to `sh -c`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// VM lifecycle commands
    #[serde(default)]
    pub vm: VmConfig,

    /// Guest access commands
    #[serde(default)]
    pub guest: GuestConfig,

    /// Host-side commands
    #[serde(default)]
    pub host: HostConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Result sink settings
    #[serde(default)]
    pub results: ResultsConfig,
}

/// VM control command templates
#[derive(Debug, Deserialize, Clone)]
pub struct VmConfig {
    /// Name substituted for `{vm}`
    #[serde(default = "default_vm_name")]
    pub name: String,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_pause")]
    pub pause: String,
    /// Uses `{path}` for the save file
    #[serde(default = "default_save")]
    pub save: String,
    /// Uses `{path}` for the save file
    #[serde(default = "default_restore")]
    pub restore: String,
    /// Must exit 0 while the VM is alive
    #[serde(default = "default_status")]
    pub status: String,
    /// Uses `{cmd}` for the human monitor command
    #[serde(default = "default_monitor")]
    pub monitor: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            name: default_vm_name(),
            start: default_start(),
            pause: default_pause(),
            save: default_save(),
            restore: default_restore(),
            status: default_status(),
            monitor: default_monitor(),
        }
    }
}

fn default_vm_name() -> String {
    "avocado-vt-vm1".to_string()
}
fn default_start() -> String {
    "virsh start {vm}".to_string()
}
fn default_pause() -> String {
    "virsh suspend {vm}".to_string()
}
fn default_save() -> String {
    "virsh save {vm} {path}".to_string()
}
fn default_restore() -> String {
    "virsh restore {path}".to_string()
}
fn default_status() -> String {
    "virsh domstate {vm} | grep -qE 'running|paused'".to_string()
}
fn default_monitor() -> String {
    "virsh qemu-monitor-command --hmp {vm} '{cmd}'".to_string()
}

/// Guest access command templates
#[derive(Debug, Deserialize, Clone)]
pub struct GuestConfig {
    /// Exits 0 once the guest accepts logins
    #[serde(default = "default_login_probe")]
    pub login_probe: String,
    /// Runs `{cmd}` inside the guest
    #[serde(default = "default_exec")]
    pub exec: String,
    /// Serial console log scanned for crash markers when a login fails
    #[serde(default)]
    pub console_log: Option<PathBuf>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            login_probe: default_login_probe(),
            exec: default_exec(),
            console_log: None,
        }
    }
}

fn default_login_probe() -> String {
    "ssh -o BatchMode=yes -o ConnectTimeout=5 root@{vm} true".to_string()
}
fn default_exec() -> String {
    "ssh -o BatchMode=yes root@{vm} {cmd}".to_string()
}

/// Host command templates
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    #[serde(default = "default_drop_caches")]
    pub drop_caches: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            drop_caches: default_drop_caches(),
        }
    }
}

fn default_drop_caches() -> String {
    "sync && echo 3 > /proc/sys/vm/drop_caches".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Upper bound for any VM or host command
    #[serde(default = "default_command")]
    pub command_secs: u64,

    /// Pause between login attempts while polling a rebooting guest
    #[serde(default = "default_login_retry")]
    pub login_retry_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_secs: default_command(),
            login_retry_secs: default_login_retry(),
        }
    }
}

fn default_command() -> u64 {
    600
}
fn default_login_retry() -> u64 {
    5
}

/// Result sink configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResultsConfig {
    /// Directory for the keyval file (defaults to the data dir)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// All command templates, labelled by their config key
    pub fn templates(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("vm.start", self.vm.start.as_str()),
            ("vm.pause", self.vm.pause.as_str()),
            ("vm.save", self.vm.save.as_str()),
            ("vm.restore", self.vm.restore.as_str()),
            ("vm.status", self.vm.status.as_str()),
            ("vm.monitor", self.vm.monitor.as_str()),
            ("guest.login_probe", self.guest.login_probe.as_str()),
            ("guest.exec", self.guest.exec.as_str()),
            ("host.drop_caches", self.host.drop_caches.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.command_secs, 600);
        assert_eq!(config.timeouts.login_retry_secs, 5);
        assert_eq!(config.vm.save, "virsh save {vm} {path}");
        assert!(config.guest.console_log.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
            [vm]
            name = "rhel9"
            pause = "echo pause {vm}"

            [guest]
            console_log = "/var/log/serial.log"

            [timeouts]
            command_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.vm.name, "rhel9");
        assert_eq!(config.vm.pause, "echo pause {vm}");
        assert_eq!(config.vm.restore, "virsh restore {path}");
        assert_eq!(
            config.guest.console_log.as_deref(),
            Some(Path::new("/var/log/serial.log"))
        );
        assert_eq!(config.timeouts.command_secs, 30);
        assert_eq!(config.timeouts.login_retry_secs, 5);
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::parse("[vm\nname = ").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/vm-scenario.toml"))).unwrap_err();
        assert!(matches!(err, super::super::Error::FileRead { .. }));
    }
}
