//! Orchestrator: one soak-test run against one device.
//!
//! A run:
//! 1. Connects and requires readiness (no retry on this first connection)
//! 2. Applies the CEC interference suppression batch
//! 3. Starts the run deadline
//! 4. Replays the test's initializer, then loops passes over its step list
//!    until the deadline is reached
//! 5. After a pass that had to reconnect, resets the loop counter and
//!    replays the initializer before the next pass
//!
//! Reaching the deadline while parked in a standby wait or the reconnection
//! loop surfaces as [`RunError::DeadlineExceeded`]; the caller decides how
//! to terminate.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channel::{ControlChannel, DeviceAddress, Session, SessionState};
use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::deadline::{RunDeadline, RunDuration};
use crate::dispatch::{CommandDispatcher, FailureStreak};
use crate::error::RunError;
use crate::events::{RunEvent, RunObserver};
use crate::input::{InputError, LogLabel, parse_address};
use crate::interference::suppress_interference;
use crate::profile::TestPlan;
use crate::reconnect::{Connection, establish};
use crate::runner::{PassOutcome, SequenceRunner};

/// Collaborators shared by every component of a run.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub channel: &'a dyn ControlChannel,
    pub clock: &'a dyn Clock,
    pub observer: &'a dyn RunObserver,
    pub timing: &'a TimingConfig,
}

impl RunContext<'_> {
    /// Append `event` to the transcript; a failing transcript is unhandled.
    pub fn record(&self, event: RunEvent) -> Result<(), RunError> {
        self.observer.record(&event).map_err(RunError::Unhandled)
    }
}

/// Validated operator input for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub address: DeviceAddress,
    pub duration: RunDuration,
    pub label: LogLabel,
}

impl RunRequest {
    pub fn from_operator(
        plan: &TestPlan,
        address: &str,
        duration: RunDuration,
        label: &str,
        default_port: u16,
    ) -> Result<Self, InputError> {
        let label = LogLabel::parse(label, &plan.default_log_label())?;
        let address = parse_address(address, default_port)?;
        Ok(Self {
            address,
            duration,
            label,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes completed since the last reconnection.
    pub loops_completed: u64,
    pub reconnections: u64,
    /// Time from deadline start to the end of the loop.
    pub elapsed: Duration,
    /// Set when an unhandled error ended the loop early.
    pub aborted: Option<String>,
    /// Session state once the run let go of the device.
    pub session: SessionState,
}

struct LoopState {
    session: Session,
    streak: FailureStreak,
    loops: u64,
    reconnections: u64,
    need_initializer: bool,
}

pub struct TestOrchestrator<'a> {
    ctx: RunContext<'a>,
    plan: &'a TestPlan,
}

impl<'a> TestOrchestrator<'a> {
    pub fn new(ctx: RunContext<'a>, plan: &'a TestPlan) -> Self {
        Self { ctx, plan }
    }

    pub fn run(&self, address: &DeviceAddress, duration: RunDuration) -> Result<RunSummary, RunError> {
        self.ctx.record(RunEvent::RunStarted {
            profile: self.plan.profile.clone(),
            test: self.plan.test.title().to_string(),
        })?;

        let session = match establish(self.ctx, address)? {
            Connection::Ready(session) => session,
            Connection::Failed(reason) => {
                return Err(RunError::InitialConnection {
                    address: address.to_string(),
                    reason,
                });
            }
        };
        info!(address = %address, profile = %self.plan.profile, test = %self.plan.test, "device ready");

        suppress_interference(self.ctx, &session)?;

        let deadline = RunDeadline::starting_now(self.ctx.clock, duration);
        let mut state = LoopState {
            session,
            streak: FailureStreak::default(),
            loops: 0,
            reconnections: 0,
            need_initializer: true,
        };

        let aborted = match self.drive(&mut state, &deadline) {
            Ok(()) => None,
            Err(RunError::Unhandled(e)) => {
                let reason = format!("{e:#}");
                warn!(error = %reason, loops = state.loops, "run aborted");
                if let Err(log_err) = self.ctx.observer.record(&RunEvent::RunAborted {
                    reason: reason.clone(),
                }) {
                    warn!(error = %log_err, "failed to record abort");
                }
                Some(reason)
            }
            Err(other) => return Err(other),
        };

        if let Err(e) = self.ctx.observer.record(&RunEvent::RunCompleted {
            test: self.plan.test.title().to_string(),
            duration_secs: duration.as_secs(),
        }) {
            warn!(error = %e, "failed to record run completion");
        }
        let session = match self.ctx.channel.disconnect(&state.session) {
            Ok(()) => state.session.into_disconnected(),
            Err(e) => {
                debug!(error = %e, "disconnect at end of run failed");
                state.session
            }
        };

        Ok(RunSummary {
            loops_completed: state.loops,
            reconnections: state.reconnections,
            elapsed: deadline.elapsed(self.ctx.clock),
            aborted,
            session: session.state(),
        })
    }

    fn drive(&self, state: &mut LoopState, deadline: &RunDeadline) -> Result<(), RunError> {
        let runner = SequenceRunner::new(self.ctx, self.plan);

        while !deadline.is_exceeded(self.ctx.clock) {
            if state.need_initializer {
                self.run_initializer(state)?;
                state.need_initializer = false;
            }

            match runner.run_pass(&state.session, state.streak, deadline)? {
                PassOutcome::Completed { streak } => {
                    state.streak = streak;
                    state.loops += 1;
                    self.ctx.record(RunEvent::LoopConcluded {
                        loop_number: state.loops,
                    })?;
                }
                PassOutcome::Reconnected {
                    session,
                    streak,
                    failed_at,
                } => {
                    debug!(failed_at, loops = state.loops, "pass interrupted by reconnection");
                    state.session = session;
                    state.streak = streak;
                    state.loops = 0;
                    state.reconnections += 1;
                    state.need_initializer = true;
                    self.ctx.record(RunEvent::PassRestarted)?;
                }
            }
        }
        Ok(())
    }

    /// Best-effort: failures are reported but never trigger a reconnect.
    fn run_initializer(&self, state: &mut LoopState) -> Result<(), RunError> {
        if self.plan.initializer.is_empty() {
            return Ok(());
        }
        let dispatcher = CommandDispatcher::new(self.ctx);
        self.ctx.record(RunEvent::InitializerStarted)?;
        for step in &self.plan.initializer {
            state.streak = dispatcher.send(&state.session, step, state.streak)?.streak;
        }
        self.ctx.record(RunEvent::InitializerCompleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{KeyCode, PowerState};
    use crate::profile::{Catalog, Step, TestType};
    use crate::test_support::{Call, FakeChannel, ManualClock, RecordingObserver};
    use anyhow::bail;

    fn addr() -> DeviceAddress {
        DeviceAddress::new("192.168.0.40", 5555)
    }

    fn plan(initializer: Vec<Step>, steps: Vec<Step>) -> TestPlan {
        TestPlan {
            profile: "lab".into(),
            test: TestType::Navigation,
            initializer,
            steps,
            reinitializer: vec![Step::key(KeyCode::Home)],
            check_standby: true,
        }
    }

    fn run_with(
        channel: &FakeChannel,
        clock: &ManualClock,
        observer: &dyn RunObserver,
        plan: &TestPlan,
        secs: i64,
    ) -> Result<RunSummary, RunError> {
        let timing = TimingConfig::default();
        let ctx = RunContext {
            channel,
            clock,
            observer,
            timing: &timing,
        };
        TestOrchestrator::new(ctx, plan).run(&addr(), RunDuration::from_secs(secs).unwrap())
    }

    /// Records like [`RecordingObserver`] but fails on the first event that
    /// matches.
    struct FailingObserver<F> {
        inner: RecordingObserver,
        fail_on: F,
    }

    impl<F: Fn(&RunEvent) -> bool> RunObserver for FailingObserver<F> {
        fn record(&self, event: &RunEvent) -> anyhow::Result<()> {
            if (self.fail_on)(event) {
                bail!("No space left on device");
            }
            self.inner.record(event)
        }
    }

    #[test]
    fn scenario_a_healthy_device_counts_every_pass() {
        let channel = FakeChannel::healthy();
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(
            Vec::new(),
            vec![Step::key(KeyCode::Ok).with_settle(Duration::from_secs(2))],
        );

        let summary = run_with(&channel, &clock, &observer, &plan, 10).unwrap();

        assert_eq!(summary.loops_completed, 5);
        assert_eq!(summary.reconnections, 0);
        assert_eq!(summary.elapsed, Duration::from_secs(10));
        assert!(summary.aborted.is_none());
        assert_eq!(
            observer.count(|e| matches!(
                e,
                RunEvent::ReconnectStarted | RunEvent::PassRestarted
            )),
            0
        );
        let loops: Vec<u64> = observer
            .events()
            .iter()
            .filter_map(|e| match e {
                RunEvent::LoopConcluded { loop_number } => Some(*loop_number),
                _ => None,
            })
            .collect();
        assert_eq!(loops, vec![1, 2, 3, 4, 5]);
        assert_eq!(channel.count(&Call::Disconnect), 1);
        assert_eq!(summary.session, SessionState::Disconnected);
    }

    #[test]
    fn scenario_b_recovery_resets_counter_and_restarts_pass() {
        let channel = FakeChannel::healthy();
        // Commands: 1 init HOME, 2-4 first pass, 5 UP, 6 RIGHT fails.
        channel.fail_commands([6]);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(
            vec![Step::key(KeyCode::Home)],
            vec![
                Step::key(KeyCode::Up),
                Step::key(KeyCode::Right),
                Step::key(KeyCode::Down),
            ],
        );

        let summary = run_with(&channel, &clock, &observer, &plan, 150).unwrap();

        assert_eq!(summary.reconnections, 1);
        let events = observer.events();
        let restart = events
            .iter()
            .position(|e| *e == RunEvent::PassRestarted)
            .unwrap();
        assert!(events[..restart].contains(&RunEvent::LoopConcluded { loop_number: 1 }));
        let after: Vec<_> = events[restart..]
            .iter()
            .filter_map(|e| match e {
                RunEvent::LoopConcluded { loop_number } => Some(*loop_number),
                _ => None,
            })
            .collect();
        assert_eq!(after.first(), Some(&1));
        assert_eq!(summary.loops_completed, *after.last().unwrap());

        // Initializer once at start and exactly once more after recovery.
        assert_eq!(
            observer.count(|e| *e == RunEvent::InitializerStarted),
            2
        );
        // Reinitializer HOME, initializer HOME, then the pass from its first step.
        let keys = channel.keys();
        assert_eq!(
            &keys[..9],
            &[
                KeyCode::Home,
                KeyCode::Up,
                KeyCode::Right,
                KeyCode::Down,
                KeyCode::Up,
                KeyCode::Right,
                KeyCode::Home,
                KeyCode::Home,
                KeyCode::Up,
            ]
        );
    }

    #[test]
    fn scenario_c_unreachable_device_hits_deadline_fatally() {
        let channel = FakeChannel::healthy();
        channel.script_connects([true]).set_connect_default(false);
        channel.fail_commands([1]);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 8).unwrap_err();

        assert!(matches!(err, RunError::DeadlineExceeded { duration_secs: 8 }));
        assert_eq!(
            observer.events().last(),
            Some(&RunEvent::DeadlineInReconnect { duration_secs: 8 })
        );
        assert_eq!(observer.count(|e| matches!(e, RunEvent::RunCompleted { .. })), 0);
        assert_eq!(channel.count(&Call::Disconnect), 0);
    }

    #[test]
    fn scenario_d_oversized_label_is_rejected_before_any_device_call() {
        let channel = FakeChannel::healthy();
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project1", TestType::Zapping).unwrap();
        let label = "l".repeat(55);

        let err = RunRequest::from_operator(
            plan,
            "192.168.0.40",
            RunDuration::TWELVE_HOURS,
            &label,
            5555,
        )
        .unwrap_err();

        assert_eq!(err, InputError::LabelTooLong { len: 55 });
        assert!(channel.calls().is_empty());
    }

    #[test]
    fn run_request_defaults_label_and_port() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project3", TestType::Apps).unwrap();
        let request =
            RunRequest::from_operator(plan, "10.0.0.8", RunDuration::TWELVE_HOURS, "", 5555)
                .unwrap();
        assert_eq!(request.label.as_str(), "log_apps_project3");
        assert_eq!(request.address.to_string(), "10.0.0.8:5555");
    }

    #[test]
    fn initial_connection_failure_is_not_retried() {
        let channel = FakeChannel::healthy();
        channel.set_connect_default(false);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 60).unwrap_err();

        assert!(matches!(err, RunError::InitialConnection { .. }));
        assert_eq!(channel.count(&Call::Connect(addr().to_string())), 1);
        assert!(channel.keys().is_empty());
    }

    #[test]
    fn initial_not_ready_is_a_connection_error() {
        let channel = FakeChannel::healthy();
        channel.set_ready_default(false);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 60).unwrap_err();
        assert!(matches!(err, RunError::InitialConnection { .. }));
    }

    #[test]
    fn deadline_starts_after_setup() {
        let channel = FakeChannel::healthy();
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(
            Vec::new(),
            vec![Step::key(KeyCode::Ok).with_settle(Duration::from_secs(5))],
        );

        let summary = run_with(&channel, &clock, &observer, &plan, 10).unwrap();

        // Connect settle (10s) and interference settle (5s) precede the deadline.
        assert_eq!(clock.elapsed(), Duration::from_secs(25));
        assert_eq!(summary.loops_completed, 2);
        let writes = channel
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Apply(_)))
            .count();
        assert_eq!(writes, 9);
    }

    #[test]
    fn initializer_failures_do_not_reconnect() {
        let channel = FakeChannel::healthy();
        channel.fail_commands([1]);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(
            vec![Step::key(KeyCode::Home), Step::key(KeyCode::Live)],
            vec![Step::key(KeyCode::Ok)],
        );

        let summary = run_with(&channel, &clock, &observer, &plan, 20).unwrap();

        assert_eq!(summary.reconnections, 0);
        assert_eq!(observer.count(|e| *e == RunEvent::ReconnectStarted), 0);
        assert_eq!(observer.count(|e| *e == RunEvent::InitializerCompleted), 1);
    }

    #[test]
    fn standby_past_deadline_is_fatal() {
        let channel = FakeChannel::healthy();
        channel.set_power_default(PowerState::DisplayOff);
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 30).unwrap_err();

        assert!(err.is_fatal());
        assert!(channel.keys().is_empty());
    }

    #[test]
    fn deadline_in_reconnect_stays_fatal_when_transcript_fails() {
        let channel = FakeChannel::healthy();
        channel.script_connects([true]).set_connect_default(false);
        channel.fail_commands([1]);
        let clock = ManualClock::new();
        let observer = FailingObserver {
            inner: RecordingObserver::new(),
            fail_on: |e: &RunEvent| matches!(e, RunEvent::DeadlineInReconnect { .. }),
        };
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 8).unwrap_err();

        assert!(matches!(err, RunError::DeadlineExceeded { duration_secs: 8 }));
        assert_eq!(channel.count(&Call::Disconnect), 0);
        assert_eq!(
            observer
                .inner
                .count(|e| matches!(e, RunEvent::RunCompleted { .. } | RunEvent::RunAborted { .. })),
            0
        );
    }

    #[test]
    fn deadline_in_standby_stays_fatal_when_transcript_fails() {
        let channel = FakeChannel::healthy();
        channel.set_power_default(PowerState::Asleep);
        let clock = ManualClock::new();
        let observer = FailingObserver {
            inner: RecordingObserver::new(),
            fail_on: |e: &RunEvent| matches!(e, RunEvent::DeadlineInStandby { .. }),
        };
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let err = run_with(&channel, &clock, &observer, &plan, 30).unwrap_err();

        assert!(matches!(err, RunError::DeadlineExceeded { duration_secs: 30 }));
        assert_eq!(channel.count(&Call::Disconnect), 0);
    }

    #[test]
    fn unhandled_error_ends_run_gracefully() {
        let channel = FakeChannel::healthy();
        let clock = ManualClock::new();
        let observer = FailingObserver {
            inner: RecordingObserver::new(),
            fail_on: |e: &RunEvent| *e == RunEvent::LoopConcluded { loop_number: 2 },
        };
        let plan = plan(Vec::new(), vec![Step::key(KeyCode::Ok)]);

        let summary = run_with(&channel, &clock, &observer, &plan, 3600).unwrap();

        let reason = summary.aborted.unwrap();
        assert!(reason.contains("No space left on device"));
        assert_eq!(summary.loops_completed, 2);
        assert_eq!(channel.count(&Call::Disconnect), 1);
        assert!(
            observer
                .inner
                .events()
                .iter()
                .any(|e| matches!(e, RunEvent::RunAborted { .. }))
        );
    }

    #[test]
    fn full_builtin_plan_runs_to_completion() {
        let channel = FakeChannel::healthy();
        let clock = ManualClock::new();
        let observer = RecordingObserver::new();
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project1", TestType::Zapping).unwrap();

        let summary = run_with(&channel, &clock, &observer, plan, 43_200).unwrap();

        assert!(summary.loops_completed > 0);
        assert_eq!(summary.reconnections, 0);
        assert!(summary.elapsed >= Duration::from_secs(43_200));
        assert_eq!(
            observer.events().last(),
            Some(&RunEvent::RunCompleted {
                test: "Zapping".into(),
                duration_secs: 43_200,
            })
        );
    }
}
