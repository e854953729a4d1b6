//! Android key codes used by the soak tests.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Remote-control keys, named the way the catalog refers to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyCode {
    Home,
    Back,
    Up,
    Down,
    Left,
    Right,
    Ok,
    VolumeUp,
    VolumeDown,
    #[serde(alias = "POWER")]
    Standby,
    Mute,
    ChannelUp,
    ChannelDown,
    Live,
    Guide,
    Wakeup,
}

impl KeyCode {
    /// Numeric `KEYCODE_*` value passed to `input keyevent`.
    pub fn code(self) -> u16 {
        match self {
            Self::Home => 3,
            Self::Back => 4,
            Self::Up => 19,
            Self::Down => 20,
            Self::Left => 21,
            Self::Right => 22,
            Self::Ok => 23,
            Self::VolumeUp => 24,
            Self::VolumeDown => 25,
            Self::Standby => 26,
            Self::Mute => 164,
            Self::ChannelUp => 166,
            Self::ChannelDown => 167,
            Self::Live => 170,
            Self::Guide => 172,
            Self::Wakeup => 224,
        }
    }

    /// Name used in the run transcript.
    pub fn label(self) -> &'static str {
        match self {
            Self::Home => "KEY_HOME",
            Self::Back => "KEY_BACK",
            Self::Up => "KEY_UP",
            Self::Down => "KEY_DOWN",
            Self::Left => "KEY_LEFT",
            Self::Right => "KEY_RIGHT",
            Self::Ok => "KEY_OK",
            Self::VolumeUp => "KEY_VOLUME_UP",
            Self::VolumeDown => "KEY_VOLUME_DOWN",
            Self::Standby => "KEY_STANDBY",
            Self::Mute => "KEY_MUTE",
            Self::ChannelUp => "KEY_CHANNEL_UP",
            Self::ChannelDown => "KEY_CHANNEL_DOWN",
            Self::Live => "KEY_LIVE",
            Self::Guide => "KEY_GUIDE",
            Self::Wakeup => "KEY_WAKEUP",
        }
    }

    /// Pause before the key is dispatched.
    ///
    /// Channel changes wait for the previous zap to finish rendering; BACK and
    /// GUIDE wait for the menu they close or open to be interactive.
    pub fn default_lead_in(self) -> Duration {
        let secs = match self {
            Self::ChannelUp | Self::ChannelDown => 20,
            Self::Back => 10,
            Self::Guide => 5,
            _ => 0,
        };
        Duration::from_secs(secs)
    }

    /// Pause after a successful dispatch.
    pub fn default_settle(self) -> Duration {
        let secs = match self {
            Self::Home | Self::Standby => 10,
            Self::Wakeup => 20,
            Self::VolumeUp | Self::VolumeDown => 3,
            Self::Up | Self::Down | Self::Left | Self::Right | Self::Ok => 5,
            Self::Mute | Self::Live => 5,
            Self::Back | Self::Guide | Self::ChannelUp | Self::ChannelDown => 0,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
