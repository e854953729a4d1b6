//! Long-duration soak tests for Android set-top boxes driven over ADB.
//!
//! [`orchestrator::TestOrchestrator`] owns a run; it drives
//! [`runner::SequenceRunner`] passes through [`dispatch::CommandDispatcher`]
//! and the [`channel::ControlChannel`], with [`standby::StandbyMonitor`] and
//! [`reconnect::ReconnectionSupervisor`] stepping in when the device sleeps or
//! drops off.

pub mod channel;
pub mod cli;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod guard;
pub mod input;
pub mod interference;
pub mod log;
pub mod menu;
pub mod orchestrator;
pub mod profile;
pub mod reconnect;
pub mod report;
pub mod runner;
pub mod shell_completion;
pub mod standby;

#[cfg(any(test, feature = "scenario-test"))]
pub mod test_support;
