//! Single-step dispatch.

use tracing::debug;

use crate::channel::Session;
use crate::error::RunError;
use crate::events::RunEvent;
use crate::orchestrator::RunContext;
use crate::profile::{Action, Step};

/// Consecutive failed dispatches since the last success.
///
/// Only the first failure of a streak is written to the transcript. The
/// streak is a plain value handed back by every dispatch and threaded
/// through the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStreak(u32);

impl FailureStreak {
    pub fn is_reported(self) -> bool {
        self.0 > 0
    }

    pub fn len(self) -> u32 {
        self.0
    }

    fn extend(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub outcome: Outcome,
    pub streak: FailureStreak,
}

pub struct CommandDispatcher<'a> {
    ctx: RunContext<'a>,
}

impl<'a> CommandDispatcher<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run one step: lead-in pause, dispatch, then settle on success or the
    /// failure pause on a failed key press.
    pub fn send(
        &self,
        session: &Session,
        step: &Step,
        streak: FailureStreak,
    ) -> Result<Dispatched, RunError> {
        self.ctx.clock.sleep(step.lead_in);

        let result = match &step.action {
            Action::Key(key) => self.ctx.channel.send_key(session, *key),
            Action::Launch(app) => self.ctx.channel.launch_app(session, app),
        };

        match result {
            Ok(()) => {
                self.ctx.record(RunEvent::StepSent {
                    step: step.describe().to_string(),
                })?;
                self.ctx.clock.sleep(step.settle);
                Ok(Dispatched {
                    outcome: Outcome::Success,
                    streak: FailureStreak::default(),
                })
            }
            Err(e) => {
                debug!(step = step.describe(), streak = streak.len(), error = %e, "dispatch failed");
                if !streak.is_reported() {
                    self.ctx.record(RunEvent::CommandFailed {
                        step: step.describe().to_string(),
                        reason: e.to_string(),
                    })?;
                }
                if matches!(step.action, Action::Key(_)) {
                    self.ctx.clock.sleep(self.ctx.timing.failure_pause());
                }
                Ok(Dispatched {
                    outcome: Outcome::Failure,
                    streak: streak.extend(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AppTarget, KeyCode, LaunchCategory};
    use crate::config::TimingConfig;
    use crate::test_support::{FakeChannel, ManualClock, RecordingObserver};
    use std::time::Duration;

    struct Rig {
        channel: FakeChannel,
        clock: ManualClock,
        observer: RecordingObserver,
        timing: TimingConfig,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                channel: FakeChannel::healthy(),
                clock: ManualClock::new(),
                observer: RecordingObserver::new(),
                timing: TimingConfig::default(),
            }
        }

        fn ctx(&self) -> RunContext<'_> {
            RunContext {
                channel: &self.channel,
                clock: &self.clock,
                observer: &self.observer,
                timing: &self.timing,
            }
        }
    }

    fn session() -> Session {
        Session::connected(crate::channel::DeviceAddress::new("10.0.0.9", 5555)).into_ready()
    }

    #[test]
    fn success_applies_lead_in_and_settle() {
        let rig = Rig::new();
        let dispatcher = CommandDispatcher::new(rig.ctx());
        let step = Step::key(KeyCode::Back).with_settle(Duration::from_secs(2));

        let out = dispatcher
            .send(&session(), &step, FailureStreak::default())
            .unwrap();

        assert_eq!(out.outcome, Outcome::Success);
        assert_eq!(
            rig.clock.sleeps(),
            vec![Duration::from_secs(10), Duration::from_secs(2)]
        );
        assert_eq!(rig.observer.lines(), vec!["KEY_BACK sent successfully"]);
    }

    #[test]
    fn repeated_failures_are_reported_once() {
        let rig = Rig::new();
        rig.channel.set_commands_ok(false);
        let dispatcher = CommandDispatcher::new(rig.ctx());
        let step = Step::key(KeyCode::Ok);

        let mut streak = FailureStreak::default();
        for _ in 0..3 {
            let out = dispatcher.send(&session(), &step, streak).unwrap();
            assert_eq!(out.outcome, Outcome::Failure);
            streak = out.streak;
        }

        assert_eq!(streak.len(), 3);
        assert_eq!(
            rig.observer
                .count(|e| matches!(e, RunEvent::CommandFailed { .. })),
            1
        );
        // Failure pause only, never the settle delay.
        assert_eq!(rig.clock.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn success_clears_the_streak_so_next_failure_is_reported() {
        let rig = Rig::new();
        rig.channel.fail_commands([1, 3]);
        let dispatcher = CommandDispatcher::new(rig.ctx());
        let step = Step::key(KeyCode::Up);

        let mut streak = FailureStreak::default();
        for _ in 0..3 {
            streak = dispatcher.send(&session(), &step, streak).unwrap().streak;
        }
        assert_eq!(
            rig.observer
                .count(|e| matches!(e, RunEvent::CommandFailed { .. })),
            2
        );
    }

    #[test]
    fn failed_launch_skips_failure_pause() {
        let rig = Rig::new();
        rig.channel.set_commands_ok(false);
        let dispatcher = CommandDispatcher::new(rig.ctx());
        let step = Step::launch(AppTarget {
            package: "com.netflix.ninja".into(),
            activity: None,
            category: LaunchCategory::Launcher,
            label: "Netflix".into(),
        });

        let out = dispatcher
            .send(&session(), &step, FailureStreak::default())
            .unwrap();
        assert_eq!(out.outcome, Outcome::Failure);
        assert_eq!(rig.clock.elapsed(), Duration::ZERO);
        assert!(rig.observer.lines()[0].starts_with("Error sending Netflix"));
    }
}
