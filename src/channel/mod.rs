//! Device control channel.
//!
//! The orchestration core never talks to a device directly. It goes through a
//! [`ControlChannel`], a set of single-attempt primitives (connect, readiness,
//! power state, key event, app launch, configuration write) that each return
//! within a bounded per-call timeout. Retry policy lives in the callers.

pub mod adb;
pub mod keys;

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub use keys::KeyCode;

/// Network address of one device (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Ready,
}

/// One live connection to a device.
///
/// Sessions are replaced wholesale on reconnection rather than mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    address: DeviceAddress,
    serial: String,
    state: SessionState,
}

impl Session {
    pub fn connected(address: DeviceAddress) -> Self {
        let serial = address.to_string();
        Self {
            address,
            serial,
            state: SessionState::Connected,
        }
    }

    /// Consume the session, returning it marked as ready for commands.
    pub fn into_ready(self) -> Self {
        Self {
            state: SessionState::Ready,
            ..self
        }
    }

    /// Consume the session, returning it marked as disconnected.
    pub fn into_disconnected(self) -> Self {
        Self {
            state: SessionState::Disconnected,
            ..self
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Device identifier understood by the control bridge (`host:port`).
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}

/// Device power state as reported by the power manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    Asleep,
    Dozing,
    DisplayOff,
    /// The query failed or the output was not recognised.
    Unknown,
}

impl PowerState {
    pub fn is_low_power(self) -> bool {
        matches!(self, Self::Asleep | Self::Dozing | Self::DisplayOff)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Asleep => "asleep",
            Self::Dozing => "dozing",
            Self::DisplayOff => "display off",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Intent category used to resolve an app's launcher activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchCategory {
    #[default]
    Launcher,
    LeanbackLauncher,
}

impl LaunchCategory {
    pub fn intent_category(self) -> &'static str {
        match self {
            Self::Launcher => "android.intent.category.LAUNCHER",
            Self::LeanbackLauncher => "android.intent.category.LEANBACK_LAUNCHER",
        }
    }
}

/// An application to bring to the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTarget {
    pub package: String,
    /// Explicit activity; when absent the launcher entry for `category` is used.
    pub activity: Option<String>,
    pub category: LaunchCategory,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsNamespace {
    Global,
    Secure,
    System,
}

impl SettingsNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Secure => "secure",
            Self::System => "system",
        }
    }
}

/// One fire-and-forget device configuration write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWrite {
    Setting {
        namespace: SettingsNamespace,
        key: String,
        value: String,
    },
    Property {
        key: String,
        value: String,
    },
    ServiceCommand {
        args: Vec<String>,
    },
}

impl fmt::Display for ConfigWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setting {
                namespace,
                key,
                value,
            } => write!(f, "settings {} {key}={value}", namespace.as_str()),
            Self::Property { key, value } => write!(f, "property {key}={value}"),
            Self::ServiceCommand { args } => write!(f, "cmd {}", args.join(" ")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("connection to {address} rejected: {response}")]
    ConnectRejected { address: String, response: String },
}

/// Single-attempt device primitives.
///
/// Implementations must bound every call by a timeout and must not retry.
pub trait ControlChannel {
    fn connect(&self, address: &DeviceAddress) -> Result<Session, ChannelError>;

    fn disconnect(&self, session: &Session) -> Result<(), ChannelError>;

    fn is_ready(&self, session: &Session) -> bool;

    fn query_power_state(&self, session: &Session) -> PowerState;

    fn send_key(&self, session: &Session, key: KeyCode) -> Result<(), ChannelError>;

    fn launch_app(&self, session: &Session, app: &AppTarget) -> Result<(), ChannelError>;

    fn apply(&self, session: &Session, write: &ConfigWrite) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_power_states() {
        assert!(PowerState::Asleep.is_low_power());
        assert!(PowerState::Dozing.is_low_power());
        assert!(PowerState::DisplayOff.is_low_power());
        assert!(!PowerState::Active.is_low_power());
        assert!(!PowerState::Unknown.is_low_power());
    }

    #[test]
    fn session_transitions_replace_state() {
        let session = Session::connected(DeviceAddress::new("10.0.0.7", 5555));
        assert_eq!(session.serial(), "10.0.0.7:5555");
        assert_eq!(session.state(), SessionState::Connected);

        let ready = session.into_ready();
        assert!(ready.is_ready());
        assert_eq!(ready.address().port, 5555);

        let gone = ready.into_disconnected();
        assert_eq!(gone.state(), SessionState::Disconnected);
    }

    #[test]
    fn config_write_display() {
        let write = ConfigWrite::Setting {
            namespace: SettingsNamespace::Secure,
            key: "hdmi_control_enabled".into(),
            value: "0".into(),
        };
        assert_eq!(write.to_string(), "settings secure hdmi_control_enabled=0");

        let cmd = ConfigWrite::ServiceCommand {
            args: vec!["hdmi_control".into(), "cec_setting".into()],
        };
        assert_eq!(cmd.to_string(), "cmd hdmi_control cec_setting");
    }

    #[test]
    fn trait_is_object_safe() {
        fn _accepts_dyn(_channel: &dyn ControlChannel) {}
    }
}
