//! Durable registry of pids launched by the prober itself.
//!
//! Destructive close operations are gated to processes *we* started; the
//! registry persists across invocations so a later command can verify
//! ownership of a pid resolved in an earlier one.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::paths::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchedEntry {
    pub pid: u32,
    pub exe: String,
    pub timestamp_ms: u64,
}

/// Append a launched pid to the registry file.
pub fn record_launched(path: &Path, pid: u32, exe: &str, timestamp_ms: u64) -> Result<()> {
    let mut entries = load_entries(path);
    entries.push(LaunchedEntry {
        pid,
        exe: exe.to_string(),
        timestamp_ms,
    });
    debug!(pid, exe, "recording launched pid");
    save_entries(path, &entries)
}

/// True if `pid` was started by a prober launch.
pub fn is_launched(path: &Path, pid: u32) -> bool {
    load_entries(path).iter().any(|entry| entry.pid == pid)
}

/// Drop a pid from the registry (after a close).
pub fn remove_launched(path: &Path, pid: u32) -> Result<()> {
    let entries: Vec<LaunchedEntry> = load_entries(path)
        .into_iter()
        .filter(|entry| entry.pid != pid)
        .collect();
    save_entries(path, &entries)
}

// A missing or corrupt file reads as empty: the registry is advisory and must
// never block resolution.
fn load_entries(path: &Path) -> Vec<LaunchedEntry> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str(&contents).unwrap_or_default()
}

fn save_entries(path: &Path, entries: &[LaunchedEntry]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(entries).context("serialize launched pids")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_query_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launched_pids.json");

        record_launched(&path, 4242, "calc.exe", 1_000).expect("record");
        assert!(is_launched(&path, 4242));
        assert!(!is_launched(&path, 4243));

        remove_launched(&path, 4242).expect("remove");
        assert!(!is_launched(&path, 4242));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(!is_launched(&temp.path().join("nope.json"), 1));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("launched_pids.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(!is_launched(&path, 1));
        // A record after corruption rewrites a valid file.
        record_launched(&path, 7, "x", 0).expect("record");
        assert!(is_launched(&path, 7));
    }
}
