//! Run-level errors.

use thiserror::Error;

pub use crate::input::InputError;

/// Why a run stopped before its loop finished normally.
#[derive(Debug, Error)]
pub enum RunError {
    /// Device unreachable or not ready at run start. Never retried.
    #[error("could not connect to {address}: {reason}")]
    InitialConnection { address: String, reason: String },

    /// The run's duration elapsed while parked in a standby wait or the
    /// reconnection loop. The top-level driver terminates the process.
    #[error("maximum run time of {duration_secs} seconds reached")]
    DeadlineExceeded { duration_secs: u64 },

    /// Anything else that broke a pass, such as the transcript becoming
    /// unwritable.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl RunError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}
