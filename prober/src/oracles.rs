//! Failure oracles: health checks run as a batch against a target.
//!
//! Each oracle produces a fresh [`OracleVerdict`]; nothing is cached between
//! passes. The batch fails iff any verdict failed, and every verdict is
//! retained for reporting, not just the first failure.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::selector::{Locate, Selector};
use crate::core::types::OracleVerdict;
use crate::io::driver::UiDriver;
use crate::io::target::ResolvedTarget;

/// Element names containing any of these read as a crash/error surface.
pub const ERROR_PATTERNS: [&str; 7] = [
    "exception",
    "error",
    "fatal",
    "unhandled",
    "crash",
    "stopped working",
    "not responding",
];

/// Oracle tuning, read-only during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Listing latency above this reads as a UI freeze.
    pub responsive_timeout_ms: u64,
    /// Traversal depth for the error-surface scan.
    pub scan_depth: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            responsive_timeout_ms: 5_000,
            scan_depth: 3,
        }
    }
}

/// Caller-supplied invariant: a selector whose presence (or absence) must
/// hold on every oracle pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantConfig {
    pub selector: Selector,
    #[serde(default = "default_expect_present")]
    pub expect_present: bool,
}

fn default_expect_present() -> bool {
    true
}

/// Liveness: fails if the target process no longer exists.
pub fn check_process_alive(target: &ResolvedTarget) -> OracleVerdict {
    if !target.is_alive() {
        return OracleVerdict::fail(
            "Process terminated",
            Some(serde_json::json!({"pid": target.pid})),
        );
    }
    OracleVerdict::pass("Process alive")
}

/// Responsiveness: a shallow listing must come back within the threshold.
/// A listing error also reads as unresponsive.
pub fn check_responsive(
    driver: &dyn UiDriver,
    target: &ResolvedTarget,
    timeout_ms: u64,
) -> OracleVerdict {
    let start = Instant::now();
    match driver.list_controls(target, 1) {
        Ok(_) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if elapsed_ms > timeout_ms {
                return OracleVerdict::fail(
                    format!("UI freeze: response took {elapsed_ms}ms"),
                    Some(serde_json::json!({"elapsed_ms": elapsed_ms})),
                );
            }
            OracleVerdict::pass("Responsive")
        }
        Err(err) => OracleVerdict::fail(format!("UI unresponsive: {err:#}"), None),
    }
}

/// Error-surface scan: pattern-match element names against the crash
/// vocabulary. An unavailable listing is not itself a failure here —
/// liveness and responsiveness own that signal.
pub fn check_error_surface(
    driver: &dyn UiDriver,
    target: &ResolvedTarget,
    depth: u32,
) -> OracleVerdict {
    let Ok(controls) = driver.list_controls(target, depth) else {
        return OracleVerdict::pass("No error dialogs found");
    };
    for control in &controls {
        let name = control.name.to_lowercase();
        for pattern in ERROR_PATTERNS {
            if name.contains(pattern) {
                return OracleVerdict::fail(
                    format!("Error dialog detected: {}", control.name),
                    serde_json::to_value(control).ok(),
                );
            }
        }
    }
    OracleVerdict::pass("No error dialogs found")
}

/// Invariant existence: the selector must (or must not) resolve to an
/// element. A failed listing counts as a violation — the invariant cannot be
/// confirmed.
pub fn check_invariant(
    driver: &dyn UiDriver,
    target: &ResolvedTarget,
    invariant: &InvariantConfig,
) -> OracleVerdict {
    let description = invariant.selector.describe();
    let found = match driver.list_controls(target, crate::io::driver::DEFAULT_DEPTH) {
        Ok(listing) => matches!(invariant.selector.locate(&listing), Locate::Found(_)),
        Err(_) => false,
    };

    match (invariant.expect_present, found) {
        (true, false) => OracleVerdict::fail(
            format!("Expected element missing: {description}"),
            Some(serde_json::json!({"selector": description})),
        ),
        (false, true) => OracleVerdict::fail(
            format!("Unexpected element present: {description}"),
            Some(serde_json::json!({"selector": description})),
        ),
        (true, true) => OracleVerdict::pass("Element exists"),
        (false, false) => OracleVerdict::pass("Element absent"),
    }
}

/// Run every built-in oracle plus one check per invariant.
///
/// The returned list always has `3 + invariants.len()` verdicts, in stable
/// order: liveness, responsiveness, error surface, then invariants.
pub fn run_all(
    driver: &dyn UiDriver,
    target: &ResolvedTarget,
    invariants: &[InvariantConfig],
    config: &OracleConfig,
) -> Vec<OracleVerdict> {
    let mut verdicts = vec![
        check_process_alive(target),
        check_responsive(driver, target, config.responsive_timeout_ms),
        check_error_surface(driver, target, config.scan_depth),
    ];
    for invariant in invariants {
        verdicts.push(check_invariant(driver, target, invariant));
    }
    debug!(
        total = verdicts.len(),
        failed = verdicts.iter().filter(|verdict| verdict.failed).count(),
        "oracle batch complete"
    );
    verdicts
}

/// Batch aggregation rule: failed iff any verdict failed.
pub fn any_failed(verdicts: &[OracleVerdict]) -> bool {
    verdicts.iter().any(|verdict| verdict.failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{element, ScriptedDriver};

    fn live_target() -> ResolvedTarget {
        ResolvedTarget {
            pid: std::process::id(),
            process_name: "prober-test".to_string(),
            window_handle: None,
        }
    }

    fn dead_target() -> ResolvedTarget {
        // Spawn a process and wait for it so the pid has provably exited.
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn child");
        let pid = child.id();
        child.wait().expect("wait child");
        ResolvedTarget {
            pid,
            process_name: "gone".to_string(),
            window_handle: None,
        }
    }

    #[test]
    fn liveness_passes_for_running_process() {
        let verdict = check_process_alive(&live_target());
        assert!(!verdict.failed);
    }

    #[test]
    fn liveness_fails_for_exited_process() {
        let verdict = check_process_alive(&dead_target());
        assert!(verdict.failed);
        assert_eq!(verdict.reason, "Process terminated");
    }

    #[test]
    fn error_surface_matches_crash_vocabulary() {
        let driver = ScriptedDriver::default().with_listing(vec![
            element("ok", "OK", "Button"),
            element("dlg", "Unhandled exception in app", "Window"),
        ]);
        let verdict = check_error_surface(&driver, &live_target(), 3);
        assert!(verdict.failed);
        assert!(verdict.reason.contains("Unhandled exception"));
    }

    #[test]
    fn error_surface_clean_listing_passes() {
        let driver = ScriptedDriver::default().with_listing(vec![element("ok", "OK", "Button")]);
        let verdict = check_error_surface(&driver, &live_target(), 3);
        assert!(!verdict.failed);
    }

    #[test]
    fn responsiveness_fails_when_listing_errors() {
        let driver = ScriptedDriver::default().with_listing_failure("tree gone");
        let verdict = check_responsive(&driver, &live_target(), 5_000);
        assert!(verdict.failed);
        assert!(verdict.reason.contains("UI unresponsive"));
    }

    #[test]
    fn invariant_missing_element_fails() {
        let driver = ScriptedDriver::default().with_listing(vec![element("ok", "OK", "Button")]);
        let invariant = InvariantConfig {
            selector: Selector {
                automation_id: Some("StatusBar".to_string()),
                ..Selector::default()
            },
            expect_present: true,
        };
        let verdict = check_invariant(&driver, &live_target(), &invariant);
        assert!(verdict.failed);
        assert!(verdict.reason.contains("Expected element missing"));
    }

    #[test]
    fn invariant_unexpected_presence_fails() {
        let driver = ScriptedDriver::default().with_listing(vec![element("err", "Crash", "Window")]);
        let invariant = InvariantConfig {
            selector: Selector {
                automation_id: Some("err".to_string()),
                ..Selector::default()
            },
            expect_present: false,
        };
        let verdict = check_invariant(&driver, &live_target(), &invariant);
        assert!(verdict.failed);
        assert!(verdict.reason.contains("Unexpected element present"));
    }

    /// Verdict list length equals built-ins plus invariants, and the batch
    /// fails iff at least one verdict failed.
    #[test]
    fn run_all_aggregates_batch() {
        let driver = ScriptedDriver::default().with_listing(vec![element("ok", "OK", "Button")]);
        let invariants = vec![
            InvariantConfig {
                selector: Selector {
                    automation_id: Some("ok".to_string()),
                    ..Selector::default()
                },
                expect_present: true,
            },
            InvariantConfig {
                selector: Selector {
                    automation_id: Some("missing".to_string()),
                    ..Selector::default()
                },
                expect_present: true,
            },
        ];

        let verdicts = run_all(&driver, &live_target(), &invariants, &OracleConfig::default());
        assert_eq!(verdicts.len(), 3 + invariants.len());
        assert!(any_failed(&verdicts));

        let verdicts = run_all(&driver, &live_target(), &invariants[..1], &OracleConfig::default());
        assert_eq!(verdicts.len(), 4);
        assert!(!any_failed(&verdicts));
    }
}
