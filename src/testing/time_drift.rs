//! Time drift across a guest crash
//!
//! 1. Sync the host clock and log into the guest
//! 2. Sync the guest clock
//! 3. Crash the guest kernel with an NMI and make sure it stopped responding
//! 4. Leave it crashed for a while, then reset it through the monitor
//! 5. Log back in and query the guest clock offset against the NTP server

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::common::{render_template, Error, Result};
use crate::guest::{login_once, ntp, poll_login, GuestEnv, LoginPolicy};
use crate::scenario::{Check, Parameters, Scenario, Step, StepError};

/// Metric holding the guest clock offset in seconds
pub const OFFSET: &str = "offset";

/// Recorded as 1 when the NTP query output held no offset
pub const OFFSET_UNPARSED: &str = "offset_unparsed";

/// Where the NMI command is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The hypervisor monitor
    Monitor,
    /// The guest shell
    Session,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monitor => write!(f, "monitor"),
            Self::Session => write!(f, "session"),
        }
    }
}

/// NMI command in `<target>:<command>` form, e.g. `monitor:nmi`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmiCommand {
    pub target: Target,
    pub command: String,
}

impl FromStr for NmiCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (target, command) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_param("nmi_cmd", "expected <target>:<command>"))?;

        let target = match target.trim() {
            "monitor" => Target::Monitor,
            "session" => Target::Session,
            other => {
                return Err(Error::invalid_param(
                    "nmi_cmd",
                    format!("unknown target '{}', expected monitor or session", other),
                ))
            }
        };

        let command = command.trim();
        if command.is_empty() {
            return Err(Error::invalid_param("nmi_cmd", "command must not be empty"));
        }

        Ok(Self {
            target,
            command: command.to_string(),
        })
    }
}

/// Typed parameters of the time drift case
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDriftParams {
    pub ntp_server: String,
    /// Host command syncing the host clock, with `{server}` rendered
    pub host_ntp_cmd: String,
    /// Guest command syncing the guest clock
    pub ntp_cmd: String,
    /// Guest command printing the offset against the NTP server
    pub ntp_query_cmd: String,
    pub nmi: NmiCommand,
    /// How long the guest stays crashed
    pub sleep_time: Duration,
    /// Largest acceptable offset, in seconds
    pub deviation: f64,
    pub login_timeout: Duration,
    pub login_retry_interval: Duration,
    /// Guest command that must fail once the guest has crashed
    pub alive_check_cmd: String,
    pub command_timeout: Duration,
}

impl TimeDriftParams {
    /// `retry_interval` is used when `login_retry_interval` is not given
    pub fn from_params(params: &Parameters, retry_interval: Duration) -> Result<Self> {
        let ntp_server = params.text_or("ntp_server", "clock.redhat.com");
        let host_ntp_cmd = render_template(
            &params.text_or("host_ntp_cmd", "ntpdate {server}"),
            &[("server", ntp_server.as_str())],
        );

        Ok(Self {
            host_ntp_cmd,
            ntp_cmd: params.require_text("ntp_cmd")?,
            ntp_query_cmd: params.require_text("ntp_query_cmd")?,
            nmi: params.require_text("nmi_cmd")?.parse()?,
            sleep_time: params.seconds("sleep_time", 1800.0)?,
            deviation: params.number("deviation", 5.0)?,
            login_timeout: params.seconds("login_timeout", 360.0)?,
            login_retry_interval: params
                .seconds("login_retry_interval", retry_interval.as_secs_f64())?,
            alive_check_cmd: params.text_or("alive_check_cmd", "dir"),
            command_timeout: params.seconds("command_timeout", 60.0)?,
            ntp_server,
        })
    }
}

/// Build the time drift scenario
pub fn scenario(name: &str, params: TimeDriftParams, raw: Parameters) -> Scenario<GuestEnv> {
    let TimeDriftParams {
        ntp_server,
        host_ntp_cmd,
        ntp_cmd,
        ntp_query_cmd,
        nmi,
        sleep_time,
        deviation,
        login_timeout,
        login_retry_interval,
        alive_check_cmd,
        command_timeout,
    } = params;
    let policy = LoginPolicy {
        timeout: login_timeout,
        retry_interval: login_retry_interval,
    };

    Scenario::new(name)
        .params(raw)
        .setup(Step::new(
            "sync host time with ntp server",
            move |env: &mut GuestEnv, _ctx| {
                Box::pin(async move {
                    tracing::info!("Syncing host clock with {}", ntp_server);
                    let out = env.host.run(&host_ntp_cmd, command_timeout).await?;
                    if !out.success() {
                        return Err(Error::command_failed(&host_ntp_cmd, out.status, &out.output).into());
                    }
                    Ok(None)
                })
            },
        ))
        .setup(Step::new("start guest", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                if env.vm.verify_alive().await.is_err() {
                    tracing::info!("Starting VM {}", env.vm.name());
                    env.vm.start().await?;
                }
                env.vm.verify_alive().await?;
                env.session = Some(login_once(env.guest.as_mut(), login_timeout).await?);
                Ok(None)
            })
        }))
        .step(Step::new("sync time in guest", move |env: &mut GuestEnv, _ctx| {
            Box::pin(async move {
                env.session()?.cmd(&ntp_cmd, command_timeout).await?;
                Ok(None)
            })
        }))
        .step(Step::new(
            "inject nmi interrupt in vm",
            move |env: &mut GuestEnv, _ctx| {
                Box::pin(async move {
                    tracing::info!("Sending '{}' to the {}", nmi.command, nmi.target);
                    match nmi.target {
                        Target::Monitor => {
                            env.vm.send_monitor_command(&nmi.command).await?;
                        }
                        Target::Session => env.session()?.send_line(&nmi.command).await?,
                    }

                    match env.session()?.cmd(&alive_check_cmd, command_timeout).await {
                        Ok(_) => Err(StepError::UnexpectedAlive(format!(
                            "Guest still answers '{}' after '{}'",
                            alive_check_cmd, nmi.command
                        ))),
                        Err(e) => {
                            tracing::debug!("Guest stopped responding: {}", e);
                            Ok(None)
                        }
                    }
                })
            },
        ))
        .step(Step::new(
            format!("sleep {} seconds", sleep_time.as_secs()),
            move |env: &mut GuestEnv, _ctx| {
                Box::pin(async move {
                    env.clock.sleep(sleep_time).await;
                    Ok(None)
                })
            },
        ))
        .step(Step::new(
            "reset vm via system_reset",
            move |env: &mut GuestEnv, _ctx| {
                Box::pin(async move {
                    // The crashed guest's shell is gone
                    env.session = None;
                    env.vm.send_monitor_command("system_reset").await?;
                    env.session =
                        Some(poll_login(env.guest.as_mut(), env.clock.as_ref(), policy).await?);
                    Ok(None)
                })
            },
        ))
        .step(
            Step::new("check time offset via ntp", move |env: &mut GuestEnv, ctx| {
                Box::pin(async move {
                    let out = env
                        .session()?
                        .cmd_output(&ntp_query_cmd, command_timeout)
                        .await?;
                    let reading = ntp::parse_offset(&out.output);
                    if !reading.parsed {
                        tracing::warn!("No offset in NTP query output, assuming 0: {}", out.output.trim());
                        ctx.record(OFFSET_UNPARSED, 1.0)?;
                    }
                    tracing::info!("Guest clock offset: {}s", reading.offset);
                    Ok(Some(reading.offset))
                })
            })
            .record_as(OFFSET),
        )
        .check(Check::at_most("Check clock offset", OFFSET, deviation))
}
