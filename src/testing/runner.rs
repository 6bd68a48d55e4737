//! Test runner implementation
//!
//! Loads a scenario file, builds the case against shell-backed collaborators
//! and reports the run in the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use crate::backend::{KeyvalFile, LocalHost, ShellGuest, ShellVm};
use crate::common::config::Config;
use crate::common::{leading_program, paths, Error, Result};
use crate::guest::{Clock, GuestEnv, TokioClock};
use crate::scenario::{Outcome, RunReport, Scenario, ScenarioRunner};

use super::config::{CaseKind, TestScenario};
use super::save_restore::{self, SaveRestoreParams};
use super::time_drift::{self, TimeDriftParams};

/// How a scenario run is reported
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub verbose: bool,
    /// Suppress terminal output; the caller prints the report as JSON
    pub json: bool,
    /// Overrides `[results] dir`
    pub results_dir: Option<PathBuf>,
}

/// Turn a loaded scenario file into a runnable scenario
///
/// Parameters are validated here, so a bad file fails before any step runs.
pub fn build_scenario(test: &TestScenario, config: &Config) -> Result<Scenario<GuestEnv>> {
    let raw = test.params.clone();
    let scenario = match test.case {
        CaseKind::SaveRestore => {
            let params = SaveRestoreParams::from_params(&raw)?;
            save_restore::scenario(&test.name, params, raw)
        }
        CaseKind::TimeDriftCrash => {
            let retry = Duration::from_secs(config.timeouts.login_retry_secs);
            let params = TimeDriftParams::from_params(&raw, retry)?;
            time_drift::scenario(&test.name, params, raw)
        }
    };

    Ok(match test.deadline {
        Some(secs) => scenario.deadline(Duration::from_secs(secs)),
        None => scenario,
    })
}

/// Shell-backed collaborators for `vm_name`
pub fn backend_env(config: &Config, vm_name: &str, results_dir: &Path, clock: Arc<dyn Clock>) -> GuestEnv {
    let command_timeout = Duration::from_secs(config.timeouts.command_secs);
    let mut vm_config = config.vm.clone();
    vm_config.name = vm_name.to_string();

    GuestEnv {
        vm: Box::new(ShellVm::new(vm_config, command_timeout)),
        guest: Box::new(ShellGuest::new(vm_name, config.guest.clone())),
        host: Box::new(LocalHost::new(config.host.clone(), command_timeout)),
        clock,
        sink: Box::new(KeyvalFile::in_dir(results_dir)),
        session: None,
    }
}

/// Run a test scenario from a YAML file
pub async fn run_scenario(path: &Path, config: &Config, options: &RunOptions) -> Result<RunReport> {
    let test = TestScenario::load(path)?;
    let scenario = build_scenario(&test, config)?;

    let vm_name = test.vm.as_deref().unwrap_or(&config.vm.name);
    let results_dir = options
        .results_dir
        .clone()
        .or_else(|| config.results.dir.clone())
        .unwrap_or_else(paths::results_dir);

    if !options.json {
        println!(
            "\n{} {}",
            "Running Test:".blue().bold(),
            test.name.white().bold()
        );
        if let Some(desc) = &test.description {
            println!("  {}", desc.dimmed());
        }
        if options.verbose {
            println!("  VM: {}", vm_name.dimmed());
            println!("  Results: {}", results_dir.display().to_string().dimmed());
            for (key, value) in test.params.iter() {
                println!("  {} = {}", key, value.to_string().dimmed());
            }
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let mut env = backend_env(config, vm_name, &results_dir, clock.clone());
    let runner = ScenarioRunner::new(clock);

    let report = runner.run(scenario, &mut env).await;
    env.close_session().await;

    if !options.json {
        print_report(&report);
    }

    Ok(report)
}

/// Print the step list, warnings, metrics and outcome of a run
pub fn print_report(report: &RunReport) {
    let failure = report.outcome.failure();

    println!("\n{}", "Steps:".cyan());
    for (i, label) in report.steps_run.iter().enumerate() {
        let step_num = i + 1;
        match failure.filter(|f| &f.label == label) {
            Some(f) => println!("  {} Step {}: {}", "✗".red(), step_num, f),
            None => println!("  {} Step {}: {}", "✓".green(), step_num, label),
        }
    }

    // Failures in closing checks happen outside any step
    if let Some(f) = failure.filter(|f| !report.steps_run.contains(&f.label)) {
        println!("  {} {}", "✗".red(), f);
    }

    if !report.warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow());
        for warning in &report.warnings {
            println!(
                "  {} [{}] {} ({})",
                "!".yellow(),
                warning.label,
                warning.message,
                warning.kind.to_string().dimmed()
            );
        }
    }

    if !report.metrics.is_empty() {
        println!("\n{}", "Metrics:".cyan());
        for (name, value) in report.metrics.iter() {
            println!("  {} = {}", name, value);
        }
    }

    if report.needs_remediation() {
        println!(
            "\n{} guest image must be restored before the next test",
            "Remediation:".yellow().bold()
        );
    }

    println!(
        "\n{} ({}/{} steps)",
        match &report.outcome {
            Outcome::Passed => "✓ Test Passed".green().bold(),
            Outcome::Failed(_) => "✗ Test Failed".red().bold(),
            Outcome::Aborted(_) => "✗ Test Aborted".red().bold(),
        },
        report.steps_run.len(),
        report.steps_total
    );
}

/// Validate a scenario file and check the commands it needs are installed
///
/// Returns the number of missing programs.
pub fn check_scenario(path: &Path, config: &Config) -> Result<usize> {
    let test = TestScenario::load(path)?;
    let scenario = build_scenario(&test, config)?;

    println!(
        "\n{} {} ({} steps)",
        "Checking Test:".blue().bold(),
        test.name.white().bold(),
        scenario.len()
    );

    let mut missing = 0;
    for (key, template) in config.templates() {
        let Some(program) = leading_program(template) else {
            continue;
        };
        // Templated programs are only known at run time
        if program.contains('{') {
            continue;
        }
        match which::which(program) {
            Ok(found) => println!(
                "  {} {}: {}",
                "✓".green(),
                key,
                found.display().to_string().dimmed()
            ),
            Err(_) => {
                missing += 1;
                println!("  {} {}: '{}' not found", "✗".red(), key, program);
            }
        }
    }

    Ok(missing)
}

/// Fails with a config error naming the missing count
pub fn require_programs(missing: usize) -> Result<()> {
    if missing == 0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} required program(s) not found in PATH",
            missing
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_scenario(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("scenario.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_build_applies_deadline() {
        let test = TestScenario::parse(
            "name: sr\ncase: save_restore\ndeadline: 900\nparams:\n  save_file: /tmp/x\n",
        )
        .unwrap();
        let scenario = build_scenario(&test, &Config::default()).unwrap();
        assert_eq!(scenario.name(), "sr");
        assert_eq!(scenario.len(), 6);
    }

    #[test]
    fn test_bundled_scenarios_build() {
        let config = Config::parse(include_str!("../../scenarios/config.toml")).unwrap();
        for yaml in [
            include_str!("../../scenarios/save_restore.yaml"),
            include_str!("../../scenarios/time_drift_crash.yaml"),
        ] {
            let test = TestScenario::parse(yaml).unwrap();
            assert!(build_scenario(&test, &config).is_ok(), "{}", test.name);
        }
    }

    #[test]
    fn test_build_rejects_bad_params() {
        let test = TestScenario::parse(
            "name: drift\ncase: time_drift_crash\nparams:\n  ntp_cmd: x\n  ntp_query_cmd: y\n  nmi_cmd: serial:nmi\n",
        )
        .unwrap();
        let err = build_scenario(&test, &Config::default()).err().unwrap();
        assert!(matches!(err, Error::InvalidParam { ref key, .. } if key == "nmi_cmd"));
    }

    #[test]
    fn test_check_scenario_counts_missing_programs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_scenario(
            tmp.path(),
            "name: sr\ncase: save_restore\nparams:\n  save_file: /tmp/x\n",
        );
        let mut config = Config::default();
        config.vm.start = "sh -c true".to_string();
        config.vm.pause = "sh -c true".to_string();
        config.vm.save = "sh -c true".to_string();
        config.vm.restore = "sh -c true".to_string();
        config.vm.status = "sh -c true".to_string();
        config.vm.monitor = "definitely-not-installed-vmctl {cmd}".to_string();
        config.guest.login_probe = "sh -c true".to_string();
        config.guest.exec = "sh -c '{cmd}'".to_string();
        config.host.drop_caches = "sudo sh -c true".to_string();

        let missing = check_scenario(&path, &config).unwrap();
        assert_eq!(missing, 1);
        assert!(require_programs(missing).is_err());
        assert!(require_programs(0).is_ok());
    }
}
