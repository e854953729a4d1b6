//! Run transcript events.
//!
//! The orchestration core reports progress only through typed [`RunEvent`]s
//! handed to a [`RunObserver`]. The `Display` rendering is the transcript
//! line the operator reads.

use std::fmt;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    RunStarted { profile: String, test: String },
    Connected { address: String },
    ConnectFailed { address: String, reason: String },
    NotReady { address: String },
    InterferenceStarted,
    InterferenceWrite { write: String, applied: bool },
    InterferenceSummary { applied: usize, total: usize },
    InitializerStarted,
    InitializerCompleted,
    StepSent { step: String },
    CommandFailed { step: String, reason: String },
    StandbyDetected,
    StandbyExited,
    DeadlineInStandby { duration_secs: u64 },
    ReconnectStarted,
    ReconnectNotYetPossible { backoff_secs: u64 },
    ReconnectSucceeded,
    ReinitializerFailed,
    DeadlineInReconnect { duration_secs: u64 },
    PassRestarted,
    LoopConcluded { loop_number: u64 },
    RunAborted { reason: String },
    RunCompleted { test: String, duration_secs: u64 },
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { profile, test } => write!(
                f,
                "=== STARTING {} {} TEST ===",
                profile.to_uppercase(),
                test.to_uppercase()
            ),
            Self::Connected { address } => write!(f, "Successfully connected: {address}"),
            Self::ConnectFailed { address, reason } => {
                write!(f, "Failed to connect to {address}: {reason}")
            }
            Self::NotReady { address } => write!(f, "Device {address} is not ready"),
            Self::InterferenceStarted => {
                f.write_str("Disabling CEC (Consumer Electronics Control)...")
            }
            Self::InterferenceWrite { write, applied } => {
                let status = if *applied { "applied" } else { "FAILED" };
                write!(f, "• {write} - {status}")
            }
            Self::InterferenceSummary { applied: 0, .. } => f.write_str(
                "CEC disable failed: all writes unsuccessful. CEC interference may occur; tests will continue normally",
            ),
            Self::InterferenceSummary { applied, total } => {
                write!(f, "CEC disable completed: {applied}/{total} writes applied")
            }
            Self::InitializerStarted => f.write_str("=== EXECUTING INITIAL SEQUENCE ==="),
            Self::InitializerCompleted => f.write_str("=== INITIAL SEQUENCE COMPLETED ==="),
            Self::StepSent { step } => write!(f, "{step} sent successfully"),
            Self::CommandFailed { step, reason } => write!(f, "Error sending {step}: {reason}"),
            Self::StandbyDetected => f.write_str("STB is in STANDBY. Waiting for wake-up..."),
            Self::StandbyExited => f.write_str("STB returned from standby."),
            Self::DeadlineInStandby { duration_secs } => {
                write!(f, "Maximum time of {duration_secs} seconds reached during standby.")
            }
            Self::ReconnectStarted => f.write_str("Attempting device reconnection..."),
            Self::ReconnectNotYetPossible { backoff_secs } => write!(
                f,
                "Reconnection not yet possible. Trying again in {backoff_secs}s..."
            ),
            Self::ReconnectSucceeded => {
                f.write_str("Reconnection successful! Restarting command sequence...")
            }
            Self::ReinitializerFailed => {
                f.write_str("Failed to resend commands after reconnection.")
            }
            Self::DeadlineInReconnect { duration_secs } => write!(
                f,
                "Maximum execution time of {duration_secs} seconds reached during reconnection."
            ),
            Self::PassRestarted => {
                f.write_str("RECONNECTION DETECTED - RESTARTING TEST FROM BEGINNING")
            }
            Self::LoopConcluded { loop_number } => write!(f, "LOOP {loop_number} CONCLUDED"),
            Self::RunAborted { reason } => {
                write!(f, "Execution terminated due to fatal error: {reason}")
            }
            Self::RunCompleted {
                test,
                duration_secs,
            } => write!(f, "{test} test of {duration_secs} seconds completed."),
        }
    }
}

/// Receives every transcript event of a run.
///
/// A failing observer ends the run; it is never silently skipped.
pub trait RunObserver {
    fn record(&self, event: &RunEvent) -> Result<()>;
}
