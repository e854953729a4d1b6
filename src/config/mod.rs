use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILENAME: &str = "config.toml";
const CONFIG_DIR: &str = ".stb-soak";

/// Lower bound on the standby poll interval.
pub const MIN_STANDBY_POLL_SECS: u64 = 10;

fn default_adb_program() -> String {
    "adb".to_string()
}

fn default_adb_port() -> u16 {
    5555
}

fn default_command_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_settings_timeout_secs() -> u64 {
    10
}

fn default_connect_settle_secs() -> u64 {
    10
}

fn default_standby_poll_secs() -> u64 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

fn default_reconnect_settle_secs() -> u64 {
    30
}

fn default_failure_pause_secs() -> u64 {
    5
}

fn default_interference_settle_secs() -> u64 {
    5
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs_stb")
}

fn default_session_markers() -> Vec<String> {
    vec!["STY".to_string(), "TMUX".to_string()]
}

/// How to reach the ADB bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct AdbConfig {
    #[serde(default = "default_adb_program")]
    pub program: String,
    /// Port used when an address is given without one.
    #[serde(default = "default_adb_port")]
    pub port: u16,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_settings_timeout_secs")]
    pub settings_timeout_secs: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            program: default_adb_program(),
            port: default_adb_port(),
            command_timeout_secs: default_command_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            settings_timeout_secs: default_settings_timeout_secs(),
        }
    }
}

impl AdbConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, secs) in [
            ("adb.command_timeout_secs", self.command_timeout_secs),
            ("adb.connect_timeout_secs", self.connect_timeout_secs),
            ("adb.settings_timeout_secs", self.settings_timeout_secs),
        ] {
            if secs == 0 {
                bail!("{key} must be greater than 0");
            }
        }
        Ok(())
    }
}

/// Fixed pauses of the run loop.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_connect_settle_secs")]
    pub connect_settle_secs: u64,
    #[serde(default = "default_standby_poll_secs")]
    pub standby_poll_secs: u64,
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    #[serde(default = "default_reconnect_settle_secs")]
    pub reconnect_settle_secs: u64,
    #[serde(default = "default_failure_pause_secs")]
    pub failure_pause_secs: u64,
    #[serde(default = "default_interference_settle_secs")]
    pub interference_settle_secs: u64,
}

impl TimingConfig {
    /// Reject values that would turn a wait loop into a busy loop.
    pub fn validate(&self) -> Result<()> {
        if self.standby_poll_secs < MIN_STANDBY_POLL_SECS {
            bail!(
                "timing.standby_poll_secs must be at least {MIN_STANDBY_POLL_SECS} (got {})",
                self.standby_poll_secs
            );
        }
        if self.reconnect_backoff_secs == 0 {
            bail!("timing.reconnect_backoff_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn connect_settle(&self) -> Duration {
        Duration::from_secs(self.connect_settle_secs)
    }

    pub fn standby_poll(&self) -> Duration {
        Duration::from_secs(self.standby_poll_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_secs(self.reconnect_settle_secs)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_secs(self.failure_pause_secs)
    }

    pub fn interference_settle(&self) -> Duration {
        Duration::from_secs(self.interference_settle_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_settle_secs: default_connect_settle_secs(),
            standby_poll_secs: default_standby_poll_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            reconnect_settle_secs: default_reconnect_settle_secs(),
            failure_pause_secs: default_failure_pause_secs(),
            interference_settle_secs: default_interference_settle_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    /// Directory that receives one transcript per run. Relative paths resolve
    /// against the working directory.
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

/// Environment variables that mark a detachable terminal session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_markers")]
    pub markers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            markers: default_session_markers(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilesConfig {
    /// Catalog file replacing the built-in profiles.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub adb: AdbConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

impl ProjectConfig {
    /// Search upward from `start` for a `.stb-soak/config.toml` file and load it.
    /// Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut config: ProjectConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid settings in {}", path.display()))?;
            if let Some(base) = path.parent().and_then(Path::parent) {
                config.resolve_relative_to(base);
            }
            Ok((config, Some(path)))
        } else {
            Ok((ProjectConfig::default(), None))
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.adb.validate()?;
        self.timing.validate()
    }

    /// Anchor a relative catalog path at the directory holding `.stb-soak/`.
    fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(file) = self.profiles.file.as_mut() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}
