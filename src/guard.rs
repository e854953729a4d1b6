//! Detachable terminal precondition.
//!
//! Device-driving commands only start inside `screen` or `tmux`, detected
//! through the session's environment markers.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error(
    "this command must run inside a detachable terminal session (none of {markers} is set)\n  start one with: screen -S <name>  or  tmux new -s <name>"
)]
pub struct GuardError {
    markers: String,
}

/// Succeed when any of `markers` is set to a non-empty value.
pub fn require_detachable_session<F>(markers: &[String], lookup: F) -> Result<(), GuardError>
where
    F: Fn(&str) -> Option<String>,
{
    let present = markers
        .iter()
        .any(|m| lookup(m).is_some_and(|v| !v.is_empty()));
    if present {
        Ok(())
    } else {
        Err(GuardError {
            markers: markers.join(", "),
        })
    }
}

/// [`require_detachable_session`] against the process environment.
pub fn require_detachable_session_env(markers: &[String]) -> Result<(), GuardError> {
    require_detachable_session(markers, |key| std::env::var(key).ok())
}
