//! ADB command-line bridge.
//!
//! Wraps `adb` invocations for the [`ControlChannel`] primitives: `connect`,
//! `get-state`, `dumpsys power`, `input keyevent`, `monkey`/`am start` and
//! `settings put`. Every call is a fresh `adb` process with a hard timeout;
//! an overrunning process is killed and reported as [`ChannelError::Timeout`].

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use super::{
    AppTarget, ChannelError, ConfigWrite, ControlChannel, DeviceAddress, KeyCode, PowerState,
    Session,
};
use crate::config::AdbConfig;

const WAIT_POLL: Duration = Duration::from_millis(50);
/// How long to wait for pipe output once the process itself is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of one finished `adb` invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// One row of `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub status: String,
}

impl DeviceEntry {
    /// Split a network serial into host and port, when it is one.
    pub fn host_port(&self) -> Option<(&str, &str)> {
        self.serial.split_once(':')
    }
}

#[derive(Debug, Clone)]
pub struct AdbChannel {
    program: String,
    command_timeout: Duration,
    connect_timeout: Duration,
    settings_timeout: Duration,
}

impl AdbChannel {
    pub fn new(config: &AdbConfig) -> Self {
        Self {
            program: config.program.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            settings_timeout: Duration::from_secs(config.settings_timeout_secs),
        }
    }

    /// List devices currently attached to the local ADB server.
    pub fn list_devices(&self) -> Result<Vec<DeviceEntry>, ChannelError> {
        let output = self.run(&["devices"], self.command_timeout)?;
        let output = require_success("adb devices", output)?;
        Ok(parse_device_list(&output.stdout))
    }

    fn shell(
        &self,
        session: &Session,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        let mut full = vec!["-s", session.serial(), "shell"];
        full.extend_from_slice(args);
        let output = self.run(&full, timeout)?;
        require_success(&format!("adb shell {}", args.join(" ")), output)
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, ChannelError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let rendered = format!("{} {}", self.program, args.join(" "));
        debug!(command = %rendered, timeout_secs = timeout.as_secs(), "running adb");
        run_with_timeout(cmd, &rendered, timeout)
    }
}

impl ControlChannel for AdbChannel {
    fn connect(&self, address: &DeviceAddress) -> Result<Session, ChannelError> {
        let target = address.to_string();
        let output = self.run(&["connect", &target], self.connect_timeout)?;
        let output = require_success("adb connect", output)?;
        let response = output.stdout.trim().to_string();
        if connect_succeeded(&response) {
            debug!(address = %target, response = %response, "adb connected");
            Ok(Session::connected(address.clone()))
        } else {
            Err(ChannelError::ConnectRejected {
                address: target,
                response,
            })
        }
    }

    fn disconnect(&self, session: &Session) -> Result<(), ChannelError> {
        let output = self.run(&["disconnect", session.serial()], self.command_timeout)?;
        require_success("adb disconnect", output).map(|_| ())
    }

    fn is_ready(&self, session: &Session) -> bool {
        match self.run(&["-s", session.serial(), "get-state"], self.command_timeout) {
            Ok(output) => output.success && output.stdout.trim() == "device",
            Err(e) => {
                debug!(error = %e, "get-state failed");
                false
            }
        }
    }

    fn query_power_state(&self, session: &Session) -> PowerState {
        match self.shell(session, &["dumpsys", "power"], self.command_timeout) {
            Ok(output) => parse_power_state(&output.stdout),
            Err(e) => {
                debug!(error = %e, "power state query failed");
                PowerState::Unknown
            }
        }
    }

    fn send_key(&self, session: &Session, key: KeyCode) -> Result<(), ChannelError> {
        let code = key.code().to_string();
        self.shell(session, &["input", "keyevent", &code], self.command_timeout)
            .map(|_| ())
    }

    fn launch_app(&self, session: &Session, app: &AppTarget) -> Result<(), ChannelError> {
        let category = app.category.intent_category();
        match &app.activity {
            Some(activity) => {
                let component = format!("{}/{}", app.package, activity);
                self.shell(
                    session,
                    &[
                        "am",
                        "start",
                        "-n",
                        &component,
                        "-a",
                        "android.intent.action.MAIN",
                        "-c",
                        category,
                    ],
                    self.command_timeout,
                )
                .map(|_| ())
            }
            None => {
                let output = self.shell(
                    session,
                    &["monkey", "-p", &app.package, "-c", category, "1"],
                    self.command_timeout,
                )?;
                // monkey exits 0 even when no activity matched the category.
                if output.stdout.contains("No activities found to run") {
                    return Err(ChannelError::CommandFailed {
                        command: format!("monkey -p {}", app.package),
                        detail: "no launchable activity".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn apply(&self, session: &Session, write: &ConfigWrite) -> Result<(), ChannelError> {
        let args: Vec<String> = match write {
            ConfigWrite::Setting {
                namespace,
                key,
                value,
            } => vec![
                "settings".into(),
                "put".into(),
                namespace.as_str().into(),
                key.clone(),
                value.clone(),
            ],
            ConfigWrite::Property { key, value } => {
                vec!["setprop".into(), key.clone(), value.clone()]
            }
            ConfigWrite::ServiceCommand { args } => {
                let mut full = vec!["cmd".to_string()];
                full.extend(args.iter().cloned());
                full
            }
        };
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.shell(session, &refs, self.settings_timeout).map(|_| ())
    }
}

fn require_success(command: &str, output: CommandOutput) -> Result<CommandOutput, ChannelError> {
    if output.success {
        Ok(output)
    } else {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };
        Err(ChannelError::CommandFailed {
            command: command.to_string(),
            detail,
        })
    }
}

/// Run `cmd` to completion, killing it if it outlives `timeout`.
///
/// The child runs in its own process group so a timeout also takes down
/// anything it spawned. stdout and stderr are drained on helper threads so a
/// chatty child cannot block on a full pipe; their output is collected with
/// a bounded wait.
pub fn run_with_timeout(
    mut cmd: Command,
    rendered: &str,
    timeout: Duration,
) -> Result<CommandOutput, ChannelError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ChannelError::Spawn { program, source })?;

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if started.elapsed() >= timeout => {
                if let Err(e) = kill_process_group(&mut child) {
                    warn!(command = %rendered, error = %e, "failed to kill timed-out adb call");
                }
                let _ = child.wait();
                break None;
            }
            Ok(None) => thread::sleep(WAIT_POLL),
            Err(e) => {
                if let Err(kill_err) = kill_process_group(&mut child) {
                    debug!(command = %rendered, error = %kill_err, "failed to kill adb call");
                }
                return Err(ChannelError::CommandFailed {
                    command: rendered.to_string(),
                    detail: format!("wait failed: {e}"),
                });
            }
        }
    };

    let stdout = stdout_reader.map(collect_drain).unwrap_or_default();
    let stderr = stderr_reader.map(collect_drain).unwrap_or_default();

    match status {
        Some(status) => Ok(CommandOutput {
            success: status.success(),
            stdout,
            stderr,
        }),
        None => Err(ChannelError::Timeout {
            command: rendered.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::other("process id out of range"))?;
    // SAFETY: kill(2) only signals; the group was created for this child.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });
    rx
}

/// Output a pipe produced, or empty if a surviving writer keeps it open.
fn collect_drain(output: mpsc::Receiver<String>) -> String {
    output.recv_timeout(DRAIN_GRACE).unwrap_or_default()
}

/// `adb connect` prints `connected to ...` or `already connected to ...` on
/// success and exits 0 even when the connection failed.
pub fn connect_succeeded(response: &str) -> bool {
    let lower = response.to_lowercase();
    lower.contains("connected") && !lower.contains("failed") && !lower.contains("unable")
}

/// Classify `dumpsys power` output.
pub fn parse_power_state(dumpsys: &str) -> PowerState {
    static WAKEFULNESS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)mWakefulness=(\w+)").unwrap());
    static DISPLAY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)Display Power: state=(\w+)").unwrap());

    let wakefulness = WAKEFULNESS_RE
        .captures(dumpsys)
        .map(|c| c[1].to_ascii_lowercase());
    let display = DISPLAY_RE.captures(dumpsys).map(|c| c[1].to_ascii_lowercase());

    match wakefulness.as_deref() {
        Some("asleep") => return PowerState::Asleep,
        Some("dozing") => return PowerState::Dozing,
        _ => {}
    }
    if display.as_deref() == Some("off") {
        return PowerState::DisplayOff;
    }
    if wakefulness.is_some() || display.as_deref() == Some("on") {
        PowerState::Active
    } else {
        PowerState::Unknown
    }
}

/// Parse `adb devices` output, skipping the header and daemon chatter.
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let status = parts.next()?;
            Some(DeviceEntry {
                serial: serial.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}
