//! Replay of recorded action sequences and minimization orchestration.
//!
//! Recorded files are schema-validated before they are parsed, so a
//! malformed or unknown action surfaces as [`ProbeError::ReplayError`] up
//! front instead of mid-run. Replay itself is just the shared loop under a
//! [`ReplayPolicy`]; the minimizer replays candidate subsequences through the
//! same primitives.

use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::errors::ProbeError;
use crate::core::minimize::{MinimizeOptions, minimize};
use crate::core::types::{ActionRecord, RunOutcome};
use crate::explore::{ExploreEnv, ExploreOptions, run_explore};
use crate::io::session::Session;
use crate::oracles::{any_failed, run_all};
use crate::policy::ReplayPolicy;

const ACTIONS_SCHEMA: &str = include_str!("../schemas/actions.schema.json");

/// Load and validate a recorded action file.
pub fn load_actions(path: &Path) -> Result<Vec<ActionRecord>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read actions {}", path.display()))?;
    parse_actions(&contents).map_err(|err| {
        ProbeError::ReplayError(format!("{}: {err:#}", path.display())).into()
    })
}

/// Parse and validate a recorded action document.
pub fn parse_actions(contents: &str) -> Result<Vec<ActionRecord>> {
    let instance: Value = serde_json::from_str(contents).context("parse actions json")?;
    validate_schema(&instance)?;
    let records: Vec<ActionRecord> =
        serde_json::from_value(instance).context("parse actions as records")?;
    Ok(records)
}

/// Validate the document against the embedded schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(ACTIONS_SCHEMA).context("parse actions schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile actions schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Replay a recorded sequence through the shared loop.
///
/// The step budget follows the sequence length; the caller's options control
/// delays, safety and oracles.
pub fn replay(
    env: &ExploreEnv<'_>,
    session: &mut Session,
    actions: Vec<ActionRecord>,
    options: &ExploreOptions,
) -> Result<RunOutcome> {
    let mut options = options.clone();
    // One extra step for the terminating "done" decision.
    options.max_steps = actions.len() as u32 + 1;
    let mut policy = ReplayPolicy::new(actions);
    run_explore(env, session, &mut policy, &options)
}

/// Check whether replaying `actions` still reproduces the failure.
///
/// Fail-safe bias: any error while replaying counts as "reproduced", since
/// an environment exception is itself often the defect under investigation.
pub fn reproduces(
    env: &ExploreEnv<'_>,
    actions: &[ActionRecord],
    options: &ExploreOptions,
) -> bool {
    let mut session = Session::new(env.paths);
    match replay(env, &mut session, actions.to_vec(), options) {
        Ok(outcome) => {
            if !outcome.passed {
                return true;
            }
            // Oracles once more after the full replay: the failure may only
            // show at the end.
            let verdicts = run_all(env.driver, env.target, &options.invariants, &options.oracle);
            any_failed(&verdicts)
        }
        Err(err) => {
            debug!(error = %err, "replay error counts as reproduction");
            true
        }
    }
}

/// Reduce a failing recorded sequence to a minimal reproducer by replaying
/// candidates through the loop primitives.
pub fn minimize_recorded(
    env: &ExploreEnv<'_>,
    actions: &[ActionRecord],
    options: &ExploreOptions,
    minimize_options: &MinimizeOptions,
) -> Vec<ActionRecord> {
    info!(len = actions.len(), "minimizing recorded sequence");
    let minimized = minimize(
        actions,
        |candidate| reproduces(env, candidate, options),
        minimize_options,
    );
    info!(len = minimized.len(), "minimization finished");
    minimized
}

/// Persist a (possibly minimized) sequence as pretty JSON.
pub fn save_actions(path: &Path, actions: &[ActionRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(actions).context("serialize actions")?;
    buf.push('\n');
    std::fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
