//! Human-interruption guard for interactive commands.
//!
//! Detects pointer movement before a UI operation and pauses the automation
//! until explicitly resumed. The pause flag is durable, process-external
//! state: absent = active, present = paused. It is never auto-cleared — a
//! loop must not resume itself after a human took over the pointer.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::errors::ProbeError;
use crate::io::paths::{write_atomic, ProberPaths};

/// Pointer-position source. The platform backend supplies the real one; tests
/// use fixed samplers.
pub trait PointerSampler {
    fn cursor_pos(&self) -> Result<(i32, i32)>;
}

/// Guard tuning, read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Delay between the two pointer samples.
    pub check_delay_ms: u64,
    /// Displacement above which a human is assumed to have the pointer.
    pub movement_threshold_px: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            check_delay_ms: 250,
            movement_threshold_px: 10.0,
        }
    }
}

/// Payload stored next to the pause flag for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub reason: String,
    pub command: String,
    pub detail: String,
    pub paused_at_ms: u64,
}

/// True if the pause flag exists on disk.
pub fn is_paused(paths: &ProberPaths) -> bool {
    paths.pause_path.exists()
}

/// Create the pause flag and write the info payload.
///
/// Flag creation uses `create_new` so two racing writers cannot interleave: a
/// flag that already exists is left untouched (first pause wins).
pub fn set_paused(paths: &ProberPaths, info: &PauseInfo) -> Result<()> {
    if let Some(parent) = paths.pause_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&paths.pause_path)
    {
        Ok(mut file) => {
            file.write_all(b"paused\n").context("write pause flag")?;
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!("pause flag already present");
            return Ok(());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("create pause flag {}", paths.pause_path.display()));
        }
    }

    let mut buf = serde_json::to_string_pretty(info).context("serialize pause info")?;
    buf.push('\n');
    write_atomic(&paths.pause_info_path, &buf)
}

/// Remove the pause flag. Returns true if it existed.
pub fn clear_pause(paths: &ProberPaths) -> Result<bool> {
    let existed = paths.pause_path.exists();
    for path in [&paths.pause_path, &paths.pause_info_path] {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove {}", path.display()));
            }
        }
    }
    Ok(existed)
}

/// Read the pause info payload, or `None` if absent/unreadable.
pub fn pause_info(paths: &ProberPaths) -> Option<PauseInfo> {
    let contents = std::fs::read_to_string(&paths.pause_info_path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Run the pointer-movement guard before an interactive command.
///
/// Fails with [`ProbeError::UserInterrupt`] if:
/// 1. the pause flag already exists (previously interrupted), or
/// 2. the pointer moved more than the configured threshold between two
///    samples taken `check_delay_ms` apart — in which case the flag is
///    persisted first, so every later command fails fast until `resume`.
pub fn check_guard(
    paths: &ProberPaths,
    sampler: &dyn PointerSampler,
    config: &GuardConfig,
    command_name: &str,
) -> Result<()> {
    if is_paused(paths) {
        let reason = pause_info(paths)
            .map(|info| info.reason)
            .unwrap_or_else(|| "unknown".to_string());
        return Err(ProbeError::UserInterrupt(format!(
            "previously paused ({reason}); run `prober resume` to continue"
        ))
        .into());
    }

    let (x1, y1) = sampler.cursor_pos().context("sample pointer")?;
    thread::sleep(Duration::from_millis(config.check_delay_ms));
    let (x2, y2) = sampler.cursor_pos().context("sample pointer")?;

    let dx = f64::from(x2 - x1);
    let dy = f64::from(y2 - y1);
    let distance = (dx * dx + dy * dy).sqrt();
    if distance > config.movement_threshold_px {
        let detail = format!(
            "pointer moved {distance:.1}px ({x1},{y1})->({x2},{y2}) during {}ms pre-check",
            config.check_delay_ms
        );
        warn!(command = command_name, %detail, "pausing: pointer movement detected");
        set_paused(
            paths,
            &PauseInfo {
                reason: "pointer_movement".to_string(),
                command: command_name.to_string(),
                detail: detail.clone(),
                paused_at_ms: now_ms(),
            },
        )?;
        return Err(ProbeError::UserInterrupt(detail).into());
    }

    Ok(())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedSampler;

    fn quick_config() -> GuardConfig {
        GuardConfig {
            check_delay_ms: 0,
            movement_threshold_px: 10.0,
        }
    }

    fn user_interrupt(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::UserInterrupt(_))
        )
    }

    #[test]
    fn still_pointer_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        let sampler = FixedSampler::new(vec![(100, 100), (103, 104)]);

        check_guard(&paths, &sampler, &quick_config(), "click").expect("still pointer");
        assert!(!is_paused(&paths));
    }

    #[test]
    fn displacement_above_threshold_pauses_and_sticks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        let sampler = FixedSampler::new(vec![(0, 0), (30, 40)]);

        let err = check_guard(&paths, &sampler, &quick_config(), "click").unwrap_err();
        assert!(user_interrupt(&err));
        assert!(is_paused(&paths));
        let info = pause_info(&paths).expect("pause info");
        assert_eq!(info.reason, "pointer_movement");
        assert_eq!(info.command, "click");

        // Next check fails immediately, without sampling.
        let still = FixedSampler::new(vec![(0, 0), (0, 0)]);
        let err = check_guard(&paths, &still, &quick_config(), "type_text").unwrap_err();
        assert!(user_interrupt(&err));
    }

    #[test]
    fn clear_pause_restores_operation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        let moving = FixedSampler::new(vec![(0, 0), (50, 50)]);
        check_guard(&paths, &moving, &quick_config(), "click").unwrap_err();

        assert!(clear_pause(&paths).expect("clear"));
        assert!(!is_paused(&paths));
        assert!(pause_info(&paths).is_none());

        let still = FixedSampler::new(vec![(5, 5), (5, 5)]);
        check_guard(&paths, &still, &quick_config(), "click").expect("resumed");
    }

    #[test]
    fn clear_pause_reports_absent_flag() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        assert!(!clear_pause(&paths).expect("clear"));
    }

    #[test]
    fn first_pause_wins_over_concurrent_set() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        let first = PauseInfo {
            reason: "pointer_movement".to_string(),
            command: "click".to_string(),
            detail: "first".to_string(),
            paused_at_ms: 1,
        };
        let second = PauseInfo {
            detail: "second".to_string(),
            ..first.clone()
        };

        set_paused(&paths, &first).expect("first");
        set_paused(&paths, &second).expect("second");
        assert_eq!(pause_info(&paths).expect("info").detail, "first");
    }
}
