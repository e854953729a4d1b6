//! One pass over a test's step list.

use crate::channel::Session;
use crate::deadline::RunDeadline;
use crate::dispatch::{CommandDispatcher, FailureStreak, Outcome};
use crate::error::RunError;
use crate::orchestrator::RunContext;
use crate::profile::TestPlan;
use crate::reconnect::ReconnectionSupervisor;
use crate::standby::StandbyMonitor;

#[derive(Debug)]
pub enum PassOutcome {
    /// Every step was dispatched on the original session.
    Completed { streak: FailureStreak },
    /// A step failed and the device was recovered; the rest of the pass was
    /// abandoned and the next pass must start from the first step.
    Reconnected {
        session: Session,
        streak: FailureStreak,
        failed_at: usize,
    },
}

pub struct SequenceRunner<'a> {
    ctx: RunContext<'a>,
    plan: &'a TestPlan,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(ctx: RunContext<'a>, plan: &'a TestPlan) -> Self {
        Self { ctx, plan }
    }

    pub fn run_pass(
        &self,
        session: &Session,
        streak: FailureStreak,
        deadline: &RunDeadline,
    ) -> Result<PassOutcome, RunError> {
        let dispatcher = CommandDispatcher::new(self.ctx);
        let standby = StandbyMonitor::new(self.ctx);
        let mut streak = streak;

        for (index, step) in self.plan.steps.iter().enumerate() {
            if self.plan.check_standby {
                standby.ensure_active(session, deadline)?;
            }

            let sent = dispatcher.send(session, step, streak)?;
            streak = sent.streak;
            if sent.outcome == Outcome::Failure {
                let supervisor = ReconnectionSupervisor::new(self.ctx, &self.plan.reinitializer);
                let recovered = supervisor.recover(session.address(), deadline, streak)?;
                return Ok(PassOutcome::Reconnected {
                    session: recovered.session,
                    streak: recovered.streak,
                    failed_at: index,
                });
            }
        }

        Ok(PassOutcome::Completed { streak })
    }
}
