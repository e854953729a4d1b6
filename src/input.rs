//! Operator input validation.
//!
//! Everything the operator types is checked here before any device is
//! touched. Errors are recoverable: the caller reports them and asks again.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::channel::DeviceAddress;
use crate::deadline::RunDuration;

pub const MAX_LABEL_LEN: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("IP address cannot be empty")]
    EmptyAddress,
    #[error("'{0}' is not a valid IPv4 address or host name")]
    InvalidHost(String),
    #[error("'{0}' is not a valid port")]
    InvalidPort(String),
    #[error("log name is {len} characters long (max {MAX_LABEL_LEN})")]
    LabelTooLong { len: usize },
    #[error("log name cannot contain '{0}'")]
    LabelInvalidChar(char),
    #[error("duration cannot be empty")]
    EmptyDuration,
    #[error("'{0}' is not a whole number of seconds")]
    DurationNotNumeric(String),
    #[error("duration {0} is out of range (1 to 432000 seconds, max 120 hours)")]
    DurationOutOfRange(String),
}

/// Base name of a run transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLabel(String);

impl LogLabel {
    /// Normalise operator input: trim, spaces become `_`, empty falls back to
    /// `default`.
    pub fn parse(input: &str, default: &str) -> Result<Self, InputError> {
        let label = input.trim().replace(' ', "_");
        let label = if label.is_empty() {
            default.to_string()
        } else {
            label
        };
        let len = label.chars().count();
        if len > MAX_LABEL_LEN {
            return Err(InputError::LabelTooLong { len });
        }
        if let Some(c) = label
            .chars()
            .find(|c| matches!(c, '/' | '\\') || c.is_control())
        {
            return Err(InputError::LabelInvalidChar(c));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .unwrap()
});

/// Parse `host` or `host:port`.
pub fn parse_address(input: &str, default_port: u16) -> Result<DeviceAddress, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::EmptyAddress);
    }

    let (host, port) = match input.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| InputError::InvalidPort(port.to_string()))?;
            (host, port)
        }
        None => (input, default_port),
    };

    let looks_numeric = host.chars().all(|c| c.is_ascii_digit() || c == '.');
    let valid = if looks_numeric {
        host.parse::<Ipv4Addr>().is_ok()
    } else {
        host.len() <= 253 && HOSTNAME_RE.is_match(host)
    };
    if !valid {
        return Err(InputError::InvalidHost(host.to_string()));
    }

    Ok(DeviceAddress::new(host, port))
}

/// Parse a custom duration in seconds.
pub fn parse_custom_secs(input: &str) -> Result<RunDuration, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::EmptyDuration);
    }
    let digits = input.strip_prefix('-').unwrap_or(input);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(InputError::DurationNotNumeric(input.to_string()));
    }
    match input.parse::<i64>() {
        Ok(secs) => RunDuration::from_secs(secs),
        Err(_) => Err(InputError::DurationOutOfRange(input.to_string())),
    }
}

/// Parse a command-line duration: `12h`, `24h` or whole seconds.
pub fn parse_duration_arg(input: &str) -> Result<RunDuration, InputError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "12h" => Ok(RunDuration::TWELVE_HOURS),
        "24h" => Ok(RunDuration::TWENTY_FOUR_HOURS),
        other => parse_custom_secs(other),
    }
}
