//! Low-power detection before each step.

use tracing::{debug, warn};

use crate::channel::{PowerState, Session};
use crate::deadline::RunDeadline;
use crate::error::RunError;
use crate::events::RunEvent;
use crate::orchestrator::RunContext;

pub struct StandbyMonitor<'a> {
    ctx: RunContext<'a>,
}

impl<'a> StandbyMonitor<'a> {
    pub fn new(ctx: RunContext<'a>) -> Self {
        Self { ctx }
    }

    /// Query once and, if the device is in a low-power state, block until it
    /// is active again. An `Unknown` answer does not block.
    pub fn ensure_active(&self, session: &Session, deadline: &RunDeadline) -> Result<(), RunError> {
        let state = self.ctx.channel.query_power_state(session);
        if state.is_low_power() {
            debug!(state = %state, "device in low power before step");
            self.wait_for_active(session, deadline)
        } else {
            Ok(())
        }
    }

    /// Poll every `standby_poll` until the device reports `Active`.
    ///
    /// The deadline is checked before each poll; reaching it is fatal.
    pub fn wait_for_active(&self, session: &Session, deadline: &RunDeadline) -> Result<(), RunError> {
        self.ctx.record(RunEvent::StandbyDetected)?;
        loop {
            if deadline.is_exceeded(self.ctx.clock) {
                let duration_secs = deadline.duration().as_secs();
                if let Err(e) = self.ctx.record(RunEvent::DeadlineInStandby { duration_secs }) {
                    warn!(error = %e, "failed to record deadline during standby");
                }
                return Err(RunError::DeadlineExceeded { duration_secs });
            }
            self.ctx.clock.sleep(self.ctx.timing.standby_poll());
            let state = self.ctx.channel.query_power_state(session);
            if state == PowerState::Active {
                self.ctx.record(RunEvent::StandbyExited)?;
                return Ok(());
            }
            debug!(state = %state, "still waiting for wake-up");
        }
    }
}
