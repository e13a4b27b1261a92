//! Domain error taxonomy.
//!
//! Orchestration code carries these inside `anyhow::Error` and classifies with
//! `downcast_ref` at step and command boundaries. The variants a caller is
//! expected to branch on are exactly the failure modes a run can hit.

use thiserror::Error;

/// Typed failures surfaced by resolution, location, execution and guards.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Target application/window could not be found (or has exited).
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// No element in the accessibility tree matched the selector.
    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    /// A bounded wait expired before its condition held.
    #[error("{what} timed out after {timeout_ms}ms")]
    Timeout { what: String, timeout_ms: u64 },

    /// A destructive operation was blocked by safety policy.
    #[error("destructive operation blocked: {0}")]
    SafetyViolation(String),

    /// A human took over the pointer; the run is paused until resumed.
    #[error("user interrupt: {0}")]
    UserInterrupt(String),

    /// A recorded action sequence is malformed or unreplayable.
    #[error("replay error: {0}")]
    ReplayError(String),

    /// A run definition is malformed or missing its target.
    #[error("scenario error: {0}")]
    ScenarioError(String),
}
