//! Per-run transcript.
//!
//! Every run writes one append-only text file named after the operator's
//! label and the start time, e.g. `logs_stb/night_zap_20250301_2215.txt`.
//! Each line carries a local wall-clock timestamp:
//!
//! ```text
//! [2025-03-01 22:15:07] KEY_CHANNEL_UP sent successfully
//! ```
//!
//! Lines are mirrored to the console through `tracing`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tracing::info;

use crate::events::{RunEvent, RunObserver};
use crate::input::LogLabel;

const LINE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIMESTAMP: &str = "%Y%m%d_%H%M";

/// Transcript file name for a run labelled `label` started at `started`.
pub fn transcript_file_name(label: &LogLabel, started: DateTime<Local>) -> String {
    format!("{}_{}.txt", label, started.format(FILE_TIMESTAMP))
}

fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {message}", at.format(LINE_TIMESTAMP))
}

/// Writer for one run's transcript.
pub struct RunLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RunLog {
    /// Create the transcript for a new run inside `dir`.
    pub fn create(dir: &Path, label: &LogLabel) -> Result<Self> {
        let path = dir.join(transcript_file_name(label, Local::now()));
        Self::open(&path)
    }

    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Append one timestamped line.
    pub fn line(&self, message: &str) -> Result<()> {
        let line = format_line(Local::now(), message);
        info!("{message}");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("transcript writer lock poisoned"))?;
        writeln!(writer, "{line}")
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunObserver for RunLog {
    fn record(&self, event: &RunEvent) -> Result<()> {
        self.line(&event.to_string())
    }
}
