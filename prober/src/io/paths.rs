//! Canonical paths within `.prober/` for a working root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// All prober-owned paths under a working root.
///
/// `state/` holds durable cross-invocation state (config, pause flag,
/// launched pids); `sessions/` holds per-run artifacts.
#[derive(Debug, Clone)]
pub struct ProberPaths {
    pub root: PathBuf,
    pub prober_dir: PathBuf,
    pub state_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub config_path: PathBuf,
    pub launched_path: PathBuf,
    pub pause_path: PathBuf,
    pub pause_info_path: PathBuf,
}

impl ProberPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let prober_dir = root.join(".prober");
        let state_dir = prober_dir.join("state");
        let sessions_dir = prober_dir.join("sessions");
        Self {
            root,
            prober_dir: prober_dir.clone(),
            state_dir: state_dir.clone(),
            sessions_dir,
            config_path: state_dir.join("config.toml"),
            launched_path: state_dir.join("launched_pids.json"),
            pause_path: state_dir.join("pause"),
            pause_info_path: state_dir.join("pause_info.json"),
        }
    }

    /// Create the state and session directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.state_dir, &self.sessions_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Atomically write a file (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let paths = ProberPaths::new("/work");
        assert!(paths.config_path.ends_with(".prober/state/config.toml"));
        assert!(paths.pause_path.ends_with(".prober/state/pause"));
        assert!(paths.sessions_dir.ends_with(".prober/sessions"));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        paths.ensure_dirs().expect("ensure dirs");
        assert!(paths.state_dir.is_dir());
        assert!(paths.sessions_dir.is_dir());
    }
}
