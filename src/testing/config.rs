//! Test scenario file format
//!
//! Scenario files are YAML:
//!
//! ```yaml
//! name: time drift across guest crash
//! case: time_drift_crash
//! vm: rhel9-guest
//! params:
//!   ntp_cmd: "chronyd -q 'server clock.redhat.com iburst'"
//!   ntp_query_cmd: "chronyd -Q 'server clock.redhat.com iburst'"
//!   nmi_cmd: "monitor:nmi"
//!   sleep_time: 1800
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::common::{Error, Result};
use crate::scenario::Parameters;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Which test case to run
    pub case: CaseKind,
    /// Overrides `[vm] name` from the configuration file
    pub vm: Option<String>,
    /// Overall bound on setup and main steps, in seconds
    pub deadline: Option<u64>,
    /// Case parameters
    #[serde(default)]
    pub params: Parameters,
}

/// The test cases this harness knows how to build
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    /// Save the VM to a file, restore it and time the restore
    SaveRestore,
    /// Crash the guest, reset it and check the clock offset
    TimeDriftCrash,
}

impl TestScenario {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read test scenario '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
    }
}
