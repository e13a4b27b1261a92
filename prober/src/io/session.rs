//! Session lifecycle and per-step artifact logging.
//!
//! One run = one session. A session owns its artifact directory
//! (`.prober/sessions/<session-id>/`) holding the JSONL step log, the
//! recorded action sequence, and any captured screenshots and tree
//! snapshots. The step log is a product artifact, written unconditionally;
//! it is not dev tracing.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{Action, ActionRecord};
use crate::io::paths::ProberPaths;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// One test/automation run = one session.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub base_dir: PathBuf,
    pub screens_dir: PathBuf,
    pub tree_dir: PathBuf,
    step_count: u32,
}

impl Session {
    pub fn new(paths: &ProberPaths) -> Self {
        Self::with_id(paths, &generate_session_id())
    }

    pub fn with_id(paths: &ProberPaths, session_id: &str) -> Self {
        let base_dir = paths.sessions_dir.join(session_id);
        Self {
            session_id: session_id.to_string(),
            screens_dir: base_dir.join("screens"),
            tree_dir: base_dir.join("tree"),
            base_dir,
            step_count: 0,
        }
    }

    /// Create the artifact directories.
    pub fn start(&self) -> Result<()> {
        for dir in [&self.base_dir, &self.screens_dir, &self.tree_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Advance and return the monotonically increasing step counter.
    pub fn next_step(&mut self) -> u32 {
        self.step_count += 1;
        self.step_count
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn screenshot_path(&self, step: u32) -> PathBuf {
        self.screens_dir.join(format!("step-{step:04}.png"))
    }

    pub fn snapshot_path(&self, step: u32) -> PathBuf {
        self.tree_dir.join(format!("step-{step:04}.json"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("run.log")
    }

    pub fn actions_path(&self) -> PathBuf {
        self.base_dir.join("actions.json")
    }
}

fn generate_session_id() -> String {
    format!("{:011x}-{:04x}", now_ms(), std::process::id() & 0xffff)
}

/// One line of the append-only session log.
#[derive(Debug, Clone, Serialize)]
pub struct StepLogEntry {
    pub step: u32,
    pub timestamp_ms: u64,
    pub action: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
}

impl StepLogEntry {
    pub fn new(step: u32, action: impl Into<String>) -> Self {
        Self {
            step,
            timestamp_ms: now_ms(),
            action: action.into(),
            result: None,
            error: None,
            screenshot: None,
            snapshot: None,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Append-only structured log for a session (one JSON object per line,
/// flushed per entry so a crash loses at most the in-flight line).
pub struct StepLogger {
    path: PathBuf,
    file: Option<File>,
}

impl StepLogger {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub fn open(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open session log {}", self.path.display()))?;
        self.file = Some(file);
        Ok(())
    }

    pub fn log(&mut self, entry: &StepLogEntry) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut line = serde_json::to_string(entry).context("serialize log entry")?;
        line.push('\n');
        file.write_all(line.as_bytes()).context("append log entry")?;
        file.flush().context("flush session log")?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

/// Records actions for replay, in execution order.
///
/// Records are appended *before* their action executes so a crash during
/// execution still leaves a replayable trail.
#[derive(Debug, Default)]
pub struct ActionRecorder {
    actions: Vec<ActionRecord>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action and return its record step number.
    pub fn record(&mut self, action: Action) -> u32 {
        let step = self.actions.len() as u32 + 1;
        self.actions.push(ActionRecord {
            step,
            action,
            timestamp_ms: now_ms(),
        });
        step
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    /// Persist the recorded sequence as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut buf =
            serde_json::to_string_pretty(&self.actions).context("serialize recorded actions")?;
        buf.push('\n');
        std::fs::write(path, buf).with_context(|| format!("write {}", path.display()))
    }
}
