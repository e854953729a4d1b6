//! Session establishment and mid-run recovery.
//!
//! A failed dispatch hands control to [`ReconnectionSupervisor::recover`],
//! which loops connect → readiness → settle → reinitializer until the
//! device is back or the run deadline passes:
//!
//! ```text
//!            deadline passed
//! Retrying ─────────────────────► Fatal (RunError::DeadlineExceeded)
//!   │  ▲
//!   │  │ connect/ready failed (backoff)
//!   │  │ critical reinit step failed
//!   ▼  │
//! connected + ready + settled ──► Recovered (new Session)
//! ```

use tracing::{debug, info, warn};

use crate::channel::{DeviceAddress, Session};
use crate::deadline::RunDeadline;
use crate::dispatch::{CommandDispatcher, FailureStreak, Outcome};
use crate::error::RunError;
use crate::events::RunEvent;
use crate::orchestrator::RunContext;
use crate::profile::Step;

/// Result of one connection attempt.
#[derive(Debug)]
pub enum Connection {
    Ready(Session),
    Failed(String),
}

/// Connect, wait `connect_settle`, then require readiness.
pub fn establish(ctx: RunContext<'_>, address: &DeviceAddress) -> Result<Connection, RunError> {
    let session = match ctx.channel.connect(address) {
        Ok(session) => session,
        Err(e) => {
            ctx.record(RunEvent::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Connection::Failed(e.to_string()));
        }
    };
    ctx.record(RunEvent::Connected {
        address: address.to_string(),
    })?;
    ctx.clock.sleep(ctx.timing.connect_settle());

    if ctx.channel.is_ready(&session) {
        Ok(Connection::Ready(session.into_ready()))
    } else {
        ctx.record(RunEvent::NotReady {
            address: address.to_string(),
        })?;
        Ok(Connection::Failed("device is not ready".to_string()))
    }
}

/// A fresh session after a successful recovery.
#[derive(Debug)]
pub struct Recovered {
    pub session: Session,
    pub streak: FailureStreak,
}

pub struct ReconnectionSupervisor<'a> {
    ctx: RunContext<'a>,
    reinitializer: &'a [Step],
}

impl<'a> ReconnectionSupervisor<'a> {
    /// `reinitializer` is replayed after every reconnection; its first step
    /// must succeed for the recovery to count.
    pub fn new(ctx: RunContext<'a>, reinitializer: &'a [Step]) -> Self {
        Self { ctx, reinitializer }
    }

    pub fn recover(
        &self,
        address: &DeviceAddress,
        deadline: &RunDeadline,
        streak: FailureStreak,
    ) -> Result<Recovered, RunError> {
        let dispatcher = CommandDispatcher::new(self.ctx);
        let mut streak = streak;
        let mut attempts = 0u32;

        self.ctx.record(RunEvent::ReconnectStarted)?;
        loop {
            if deadline.is_exceeded(self.ctx.clock) {
                let duration_secs = deadline.duration().as_secs();
                if let Err(e) = self.ctx.record(RunEvent::DeadlineInReconnect { duration_secs }) {
                    warn!(error = %e, "failed to record deadline during reconnect");
                }
                return Err(RunError::DeadlineExceeded { duration_secs });
            }
            attempts += 1;

            let session = match establish(self.ctx, address)? {
                Connection::Ready(session) => session,
                Connection::Failed(reason) => {
                    debug!(attempt = attempts, reason = %reason, "reconnect attempt failed");
                    let backoff = self.ctx.timing.reconnect_backoff();
                    self.ctx.record(RunEvent::ReconnectNotYetPossible {
                        backoff_secs: backoff.as_secs(),
                    })?;
                    self.ctx.clock.sleep(backoff);
                    continue;
                }
            };

            self.ctx.record(RunEvent::ReconnectSucceeded)?;
            self.ctx.clock.sleep(self.ctx.timing.reconnect_settle());

            let Some((critical, rest)) = self.reinitializer.split_first() else {
                info!(address = %address, attempts, "device recovered");
                return Ok(Recovered {
                    session,
                    streak: FailureStreak::default(),
                });
            };

            let sent = dispatcher.send(&session, critical, streak)?;
            streak = sent.streak;
            if sent.outcome == Outcome::Failure {
                self.ctx.record(RunEvent::ReinitializerFailed)?;
                continue;
            }

            for step in rest {
                streak = dispatcher.send(&session, step, streak)?.streak;
            }
            info!(address = %address, attempts, "device recovered");
            return Ok(Recovered {
                session,
                streak: FailureStreak::default(),
            });
        }
    }
}
