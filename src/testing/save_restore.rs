//! Save/restore round trip
//!
//! 1. Pause the VM
//! 2. Save it to a file
//! 3. Restore it from the file and measure how long that takes
//! 4. Remove the file
//! 5. Check the VM is still usable

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::guest::{login_once, GuestEnv};
use crate::scenario::{Check, Parameters, Scenario, Step};

/// Metric holding the restore duration in seconds
pub const RESTORE_TIME: &str = "restore_time";

/// Typed parameters of the save/restore case
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRestoreParams {
    pub login_timeout: Duration,
    /// Upper bound for the restore, in seconds
    pub expect_restore_time: f64,
    pub save_file: PathBuf,
    /// Settle time before dropping caches and restoring
    pub restore_delay: Duration,
}

impl SaveRestoreParams {
    pub fn from_params(params: &Parameters) -> Result<Self> {
        let save_file = match params.text("save_file") {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => generate_save_path()?,
        };

        Ok(Self {
            login_timeout: params.seconds("login_timeout", 360.0)?,
            expect_restore_time: params.number("expect_restore_time", 25.0)?,
            save_file,
            restore_delay: params.seconds("restore_delay", 10.0)?,
        })
    }
}

/// Fresh, not yet existing path in the temp directory
fn generate_save_path() -> Result<PathBuf> {
    let temp = tempfile::Builder::new()
        .prefix("vm-save-")
        .rand_bytes(8)
        .tempfile()
        .map_err(|e| Error::Internal(format!("Failed to generate save file name: {}", e)))?
        .into_temp_path();
    let path = temp.to_path_buf();
    temp.close()?;
    Ok(path)
}

/// Build the save/restore scenario
pub fn scenario(name: &str, params: SaveRestoreParams, raw: Parameters) -> Scenario<GuestEnv> {
    let timeout = params.login_timeout;
    let delay = params.restore_delay;
    let save_path = params.save_file.clone();
    let restore_path = params.save_file.clone();
    let remove_path = params.save_file;

    Scenario::new(name)
        .params(raw)
        .setup(Step::new("Log into guest", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.vm.verify_alive().await?;
                env.session = Some(login_once(env.guest.as_mut(), timeout).await?);
                Ok(None)
            })
        }))
        .step(Step::new("Pause VM", |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.vm.pause().await?;
                Ok(None)
            })
        }))
        .step(Step::new("Save VM to file", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.vm.save_state(&save_path).await?;
                Ok(None)
            })
        }))
        .step(
            Step::new("Restore VM from file", move |env: &mut GuestEnv, _ctx| {
                Box::pin(async move {
                    env.clock.sleep(delay).await;
                    env.host.drop_caches().await?;

                    let started = env.clock.now();
                    env.vm.restore_state(&restore_path).await?;
                    env.session = Some(login_once(env.guest.as_mut(), timeout).await?);
                    let restore_time = env.clock.now().saturating_sub(started).as_secs_f64();

                    let mut values = BTreeMap::new();
                    values.insert("result".to_string(), format!("{}s", restore_time));
                    env.sink.write_keyval(&values)?;
                    tracing::info!("Restore time: {}s", restore_time);

                    Ok(Some(restore_time))
                })
            })
            .record_as(RESTORE_TIME),
        )
        .finally(Step::new("Remove VM restoration file", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.host.remove_file(&remove_path).await?;
                Ok(None)
            })
        }))
        .finally(Step::new("Check VM", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.vm.verify_alive().await?;
                env.session = Some(login_once(env.guest.as_mut(), timeout).await?);
                Ok(None)
            })
        }))
        .check(Check::at_most(
            "Check restore time",
            RESTORE_TIME,
            params.expect_restore_time,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SaveRestoreParams::from_params(&Parameters::new()).unwrap();
        assert_eq!(params.login_timeout, Duration::from_secs(360));
        assert_eq!(params.expect_restore_time, 25.0);
        assert_eq!(params.restore_delay, Duration::from_secs(10));
        let name = params.save_file.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("vm-save-"));
        assert!(!params.save_file.exists());
    }

    #[test]
    fn test_generated_paths_differ() {
        let a = SaveRestoreParams::from_params(&Parameters::new()).unwrap();
        let b = SaveRestoreParams::from_params(&Parameters::new()).unwrap();
        assert_ne!(a.save_file, b.save_file);
    }

    #[test]
    fn test_overrides() {
        let raw = Parameters::new()
            .with("login_timeout", 60.0)
            .with("expect_restore_time", "40")
            .with("save_file", "/var/tmp/guest.save")
            .with("restore_delay", 0.0);
        let params = SaveRestoreParams::from_params(&raw).unwrap();
        assert_eq!(params.login_timeout, Duration::from_secs(60));
        assert_eq!(params.expect_restore_time, 40.0);
        assert_eq!(params.save_file, PathBuf::from("/var/tmp/guest.save"));
        assert_eq!(params.restore_delay, Duration::ZERO);
    }

    #[test]
    fn test_oversized_login_timeout_is_rejected() {
        let raw = Parameters::new().with("login_timeout", 1e20);
        let err = SaveRestoreParams::from_params(&raw).err().unwrap();
        assert!(matches!(err, Error::InvalidParam { ref key, .. } if key == "login_timeout"));
    }

    #[test]
    fn test_scenario_layout() {
        let raw = Parameters::new().with("save_file", "/tmp/x");
        let params = SaveRestoreParams::from_params(&raw).unwrap();
        let scenario = scenario("save restore", params, raw);
        assert_eq!(
            scenario.labels(),
            vec![
                "Log into guest",
                "Pause VM",
                "Save VM to file",
                "Restore VM from file",
                "Remove VM restoration file",
                "Check VM",
            ]
        );
    }
}
