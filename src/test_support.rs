//! Scripted doubles for exercising the run loop without a device.
//!
//! [`FakeChannel`] answers each primitive from a script and records every
//! call; [`ManualClock`] turns sleeps into virtual time so multi-hour runs
//! complete instantly.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::channel::{
    AppTarget, ChannelError, ConfigWrite, ControlChannel, DeviceAddress, KeyCode, PowerState,
    Session,
};
use crate::clock::Clock;
use crate::events::{RunEvent, RunObserver};

/// Virtual clock: `sleep` advances `now` instantly.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Every non-zero sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeps.borrow_mut().push(duration);
            self.advance(duration);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Disconnect,
    IsReady,
    QueryPower,
    Key(KeyCode),
    Launch(String),
    Apply(String),
}

/// Scripted [`ControlChannel`].
///
/// Queued answers are consumed first; once a queue is empty the matching
/// default applies. Key and launch dispatches share one 1-based call counter
/// so a test can fail "the 3rd command".
#[derive(Debug)]
pub struct FakeChannel {
    connect_script: RefCell<VecDeque<bool>>,
    connect_default: Cell<bool>,
    ready_script: RefCell<VecDeque<bool>>,
    ready_default: Cell<bool>,
    power_script: RefCell<VecDeque<PowerState>>,
    power_default: Cell<PowerState>,
    failing_commands: RefCell<BTreeSet<usize>>,
    commands_ok: Cell<bool>,
    failing_writes: RefCell<BTreeSet<usize>>,
    command_count: Cell<usize>,
    write_count: Cell<usize>,
    calls: RefCell<Vec<Call>>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self::healthy()
    }
}

impl FakeChannel {
    /// A device that connects, is ready, stays active and accepts everything.
    pub fn healthy() -> Self {
        Self {
            connect_script: RefCell::new(VecDeque::new()),
            connect_default: Cell::new(true),
            ready_script: RefCell::new(VecDeque::new()),
            ready_default: Cell::new(true),
            power_script: RefCell::new(VecDeque::new()),
            power_default: Cell::new(PowerState::Active),
            failing_commands: RefCell::new(BTreeSet::new()),
            commands_ok: Cell::new(true),
            failing_writes: RefCell::new(BTreeSet::new()),
            command_count: Cell::new(0),
            write_count: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn script_connects(&self, results: impl IntoIterator<Item = bool>) -> &Self {
        self.connect_script.borrow_mut().extend(results);
        self
    }

    pub fn set_connect_default(&self, ok: bool) -> &Self {
        self.connect_default.set(ok);
        self
    }

    pub fn script_ready(&self, results: impl IntoIterator<Item = bool>) -> &Self {
        self.ready_script.borrow_mut().extend(results);
        self
    }

    pub fn set_ready_default(&self, ready: bool) -> &Self {
        self.ready_default.set(ready);
        self
    }

    pub fn script_power(&self, states: impl IntoIterator<Item = PowerState>) -> &Self {
        self.power_script.borrow_mut().extend(states);
        self
    }

    pub fn set_power_default(&self, state: PowerState) -> &Self {
        self.power_default.set(state);
        self
    }

    /// Fail the given 1-based key/launch dispatches.
    pub fn fail_commands(&self, calls: impl IntoIterator<Item = usize>) -> &Self {
        self.failing_commands.borrow_mut().extend(calls);
        self
    }

    /// Make every later key/launch dispatch succeed or fail.
    pub fn set_commands_ok(&self, ok: bool) -> &Self {
        self.commands_ok.set(ok);
        self
    }

    /// Fail the given 1-based configuration writes.
    pub fn fail_writes(&self, calls: impl IntoIterator<Item = usize>) -> &Self {
        self.failing_writes.borrow_mut().extend(calls);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Keys dispatched, in order.
    pub fn keys(&self) -> Vec<KeyCode> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Key(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn next_command_ok(&self) -> bool {
        let n = self.command_count.get() + 1;
        self.command_count.set(n);
        self.commands_ok.get() && !self.failing_commands.borrow().contains(&n)
    }
}

impl ControlChannel for FakeChannel {
    fn connect(&self, address: &DeviceAddress) -> Result<Session, ChannelError> {
        self.push(Call::Connect(address.to_string()));
        let ok = self
            .connect_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.connect_default.get());
        if ok {
            Ok(Session::connected(address.clone()))
        } else {
            Err(ChannelError::ConnectRejected {
                address: address.to_string(),
                response: "failed to connect: Connection refused".to_string(),
            })
        }
    }

    fn disconnect(&self, _session: &Session) -> Result<(), ChannelError> {
        self.push(Call::Disconnect);
        Ok(())
    }

    fn is_ready(&self, _session: &Session) -> bool {
        self.push(Call::IsReady);
        self.ready_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.ready_default.get())
    }

    fn query_power_state(&self, _session: &Session) -> PowerState {
        self.push(Call::QueryPower);
        self.power_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.power_default.get())
    }

    fn send_key(&self, _session: &Session, key: KeyCode) -> Result<(), ChannelError> {
        self.push(Call::Key(key));
        if self.next_command_ok() {
            Ok(())
        } else {
            Err(ChannelError::CommandFailed {
                command: format!("input keyevent {}", key.code()),
                detail: "error: device offline".to_string(),
            })
        }
    }

    fn launch_app(&self, _session: &Session, app: &AppTarget) -> Result<(), ChannelError> {
        self.push(Call::Launch(app.package.clone()));
        if self.next_command_ok() {
            Ok(())
        } else {
            Err(ChannelError::Timeout {
                command: format!("monkey -p {}", app.package),
                secs: 5,
            })
        }
    }

    fn apply(&self, _session: &Session, write: &ConfigWrite) -> Result<(), ChannelError> {
        self.push(Call::Apply(write.to_string()));
        let n = self.write_count.get() + 1;
        self.write_count.set(n);
        if self.failing_writes.borrow().contains(&n) {
            Err(ChannelError::CommandFailed {
                command: write.to_string(),
                detail: "Permission denial".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Observer that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<RunEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn count(&self, matches: impl Fn(&RunEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| matches(e)).count()
    }
}

impl RunObserver for RecordingObserver {
    fn record(&self, event: &RunEvent) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}
