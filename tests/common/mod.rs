//! Scripted collaborators shared by the scenario tests
//!
//! Every fake records what it was asked to do into a shared [`World`] and
//! reads its behavior from there, so a test can script the VM and inspect
//! the event log afterwards. Time comes from a [`ManualClock`].

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use vmscenario::guest::{
    Clock, CommandOutput, GuestAccess, GuestEnv, GuestSession, Host, LoginResult, ManualClock,
    ResultSink, VmControl,
};
use vmscenario::{Error, Result};

/// Scripted result of one `wait_for_login` call
#[derive(Debug, Clone)]
pub enum Login {
    /// Succeeds after the given number of seconds
    Ok(u64),
    /// Gives up after the full timeout
    Timeout,
    /// Reports a crash with this console text after the given seconds
    Crash(u64, String),
}

/// State and event log shared by all fakes of one test
#[derive(Debug)]
pub struct World {
    pub events: Vec<String>,
    pub vm_alive: bool,
    /// Guest kernel is down; guest commands hang
    pub crashed: bool,
    /// The NMI is swallowed and the guest keeps running
    pub nmi_ignored: bool,
    /// Seconds the restore itself takes
    pub restore_secs: u64,
    /// Scripted logins, consumed in order; empty means instant success
    pub logins: VecDeque<Login>,
    pub ntp_output: String,
    pub host_status: i32,
    pub remove_fails: bool,
    pub removed: Vec<PathBuf>,
    pub keyval: Vec<BTreeMap<String, String>>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            vm_alive: true,
            crashed: false,
            nmi_ignored: false,
            restore_secs: 0,
            logins: VecDeque::new(),
            ntp_output: String::new(),
            host_status: 0,
            remove_fails: false,
            removed: Vec::new(),
            keyval: Vec::new(),
        }
    }
}

/// Handle to the world plus the clock every fake advances
#[derive(Clone)]
pub struct Harness {
    world: Arc<Mutex<World>>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(world: World) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
            clock: Arc::new(ManualClock::new()),
        }
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    pub fn events(&self) -> Vec<String> {
        self.world().events.clone()
    }

    fn log(&self, event: impl Into<String>) {
        self.world().events.push(event.into());
    }

    /// Collaborators wired to this harness
    pub fn env(&self) -> GuestEnv {
        GuestEnv {
            vm: Box::new(FakeVm(self.clone())),
            guest: Box::new(FakeGuest(self.clone())),
            host: Box::new(FakeHost(self.clone())),
            clock: self.clock.clone(),
            sink: Box::new(FakeSink(self.clone())),
            session: None,
        }
    }
}

pub struct FakeVm(Harness);

#[async_trait]
impl VmControl for FakeVm {
    fn name(&self) -> &str {
        "fake-vm"
    }

    async fn start(&mut self) -> Result<()> {
        self.0.log("vm: start");
        self.0.world().vm_alive = true;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.0.log("vm: pause");
        Ok(())
    }

    async fn save_state(&mut self, path: &Path) -> Result<()> {
        self.0.log(format!("vm: save {}", path.display()));
        self.0.world().vm_alive = false;
        Ok(())
    }

    async fn restore_state(&mut self, path: &Path) -> Result<()> {
        self.0.log(format!("vm: restore {}", path.display()));
        let secs = {
            let mut world = self.0.world();
            world.vm_alive = true;
            world.restore_secs
        };
        self.0.clock.advance(Duration::from_secs(secs));
        Ok(())
    }

    async fn verify_alive(&mut self) -> Result<()> {
        if self.0.world().vm_alive {
            Ok(())
        } else {
            Err(Error::VmNotAlive("fake-vm".to_string()))
        }
    }

    async fn send_monitor_command(&mut self, cmd: &str) -> Result<String> {
        self.0.log(format!("monitor: {}", cmd));
        let mut world = self.0.world();
        match cmd {
            "nmi" if !world.nmi_ignored => world.crashed = true,
            "system_reset" => world.crashed = false,
            _ => {}
        }
        Ok(String::new())
    }
}

pub struct FakeGuest(Harness);

#[async_trait]
impl GuestAccess for FakeGuest {
    async fn wait_for_login(&mut self, timeout: Duration) -> Result<LoginResult> {
        let next = self.0.world().logins.pop_front().unwrap_or(Login::Ok(0));
        self.0.log(format!("login: {:?}", next));
        match next {
            Login::Ok(secs) => {
                self.0.clock.advance(Duration::from_secs(secs));
                Ok(LoginResult::Success(Box::new(FakeSession(self.0.clone()))))
            }
            Login::Timeout => {
                self.0.clock.advance(timeout);
                Ok(LoginResult::Timeout)
            }
            Login::Crash(secs, text) => {
                self.0.clock.advance(Duration::from_secs(secs));
                Ok(LoginResult::CrashDetected(text))
            }
        }
    }
}

pub struct FakeSession(Harness);

#[async_trait]
impl GuestSession for FakeSession {
    async fn cmd_output(&mut self, cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        self.0.log(format!("guest: {}", cmd));
        let world = self.0.world();
        if world.crashed {
            drop(world);
            self.0.clock.advance(timeout);
            return Err(Error::CommandTimeout {
                command: cmd.to_string(),
                after: timeout,
            });
        }
        let output = if cmd.contains("-q") {
            world.ntp_output.clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            status: Some(0),
            output,
        })
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.0.log(format!("guest line: {}", line));
        if line.contains("sysrq-trigger") {
            self.0.world().crashed = true;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FakeHost(Harness);

#[async_trait]
impl Host for FakeHost {
    async fn run(&mut self, cmd: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.0.log(format!("host: {}", cmd));
        Ok(CommandOutput {
            status: Some(self.0.world().host_status),
            output: "adjust time server".to_string(),
        })
    }

    async fn drop_caches(&mut self) -> Result<()> {
        self.0.log("host: drop caches");
        Ok(())
    }

    async fn remove_file(&mut self, path: &Path) -> Result<()> {
        self.0.log(format!("host: remove {}", path.display()));
        let mut world = self.0.world();
        if world.remove_fails {
            return Err(Error::FileRemove {
                path: path.display().to_string(),
                error: "Device or resource busy".to_string(),
            });
        }
        world.removed.push(path.to_path_buf());
        Ok(())
    }
}

pub struct FakeSink(Harness);

impl ResultSink for FakeSink {
    fn write_keyval(&mut self, values: &BTreeMap<String, String>) -> Result<()> {
        self.0.world().keyval.push(values.clone());
        Ok(())
    }
}

/// Clock handle as the runner expects it
pub fn runner_clock(harness: &Harness) -> Arc<dyn Clock> {
    harness.clock.clone()
}
