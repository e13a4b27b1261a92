//! The shared exploration loop.
//!
//! One synchronous, single-threaded step driver serves all three policies.
//! Per step: budget check, human-interruption guard, element listing,
//! decision, safety filter, record-then-execute, periodic oracle batch,
//! optional delay. Error classification:
//!
//! - resolution/timeout/any execution error: per-step failure, the run
//!   continues (steps are independent);
//! - a failed element listing: loop-fatal, no action can be safely chosen;
//! - oracle failure: stops the run as data, not as an error;
//! - `UserInterrupt`: fatal to the command, resumable only out-of-band.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::actions::{ExecContext, LOCATE_DEPTH, capture_screenshot_quietly, execute_action};
use crate::core::safety::{DestructiveFilter, SafetyConfig};
use crate::core::types::{LoopStop, RunFailure, RunOutcome};
use crate::io::driver::{ScreenCapture, UiDriver};
use crate::io::guard::{GuardConfig, PointerSampler, check_guard};
use crate::io::paths::ProberPaths;
use crate::io::session::{ActionRecorder, Session, StepLogEntry, StepLogger};
use crate::io::snapshot::save_snapshot;
use crate::io::target::ResolvedTarget;
use crate::oracles::{InvariantConfig, OracleConfig, run_all};
use crate::policy::{Decision, DecisionPolicy, HistoryEntry, Observation};

/// Everything the loop needs from the environment.
pub struct ExploreEnv<'a> {
    pub driver: &'a dyn UiDriver,
    pub capture: Option<&'a dyn ScreenCapture>,
    /// When present, the human-interruption guard runs before every step.
    pub sampler: Option<&'a dyn PointerSampler>,
    pub paths: &'a ProberPaths,
    pub target: &'a ResolvedTarget,
}

/// Loop tuning shared by all policies.
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub max_steps: u32,
    pub step_delay_ms: u64,
    /// Run the oracle batch every N steps; 0 disables periodic oracles
    /// (used by minimizer replays, which check failure after the fact).
    pub oracle_interval: u32,
    pub history_window: usize,
    pub safety: SafetyConfig,
    pub guard: GuardConfig,
    pub oracle: OracleConfig,
    pub invariants: Vec<InvariantConfig>,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            max_steps: 50,
            step_delay_ms: 100,
            oracle_interval: 5,
            history_window: 10,
            safety: SafetyConfig::default(),
            guard: GuardConfig::default(),
            oracle: OracleConfig::default(),
            invariants: Vec::new(),
        }
    }
}

/// Drive one run to completion under the given policy.
///
/// The recorded action trail and the step log are persisted even when the
/// run ends in an error, so an interrupted or crashed run stays replayable.
pub fn run_explore<P: DecisionPolicy>(
    env: &ExploreEnv<'_>,
    session: &mut Session,
    policy: &mut P,
    options: &ExploreOptions,
) -> Result<RunOutcome> {
    let filter = DestructiveFilter::new(&options.safety)?;
    session.start()?;

    let mut logger = StepLogger::new(session.log_path());
    logger.open()?;
    let mut recorder = ActionRecorder::new();

    let mut outcome = RunOutcome {
        session_id: session.session_id.clone(),
        steps_run: 0,
        failures: Vec::new(),
        passed: true,
        seed: policy.seed(),
        stop: LoopStop::BudgetExhausted,
    };
    let mut history: Vec<HistoryEntry> = Vec::new();

    let result = step_loop(
        env,
        session,
        policy,
        options,
        &filter,
        &mut logger,
        &mut recorder,
        &mut history,
        &mut outcome,
    );

    // Persist the trail no matter how the loop ended.
    recorder
        .save(&session.actions_path())
        .context("save recorded actions")?;
    logger.close();

    result?;
    info!(
        session_id = %outcome.session_id,
        steps = outcome.steps_run,
        passed = outcome.passed,
        stop = ?outcome.stop,
        "run finished"
    );
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn step_loop<P: DecisionPolicy>(
    env: &ExploreEnv<'_>,
    session: &mut Session,
    policy: &mut P,
    options: &ExploreOptions,
    filter: &DestructiveFilter,
    logger: &mut StepLogger,
    recorder: &mut ActionRecorder,
    history: &mut Vec<HistoryEntry>,
    outcome: &mut RunOutcome,
) -> Result<()> {
    loop {
        if session.step_count() >= options.max_steps {
            outcome.stop = LoopStop::BudgetExhausted;
            return Ok(());
        }
        let step = session.next_step();
        outcome.steps_run = step;

        // The guard is fatal on purpose: a paused run never auto-resumes.
        if let Some(sampler) = env.sampler {
            check_guard(env.paths, sampler, &options.guard, "explore")?;
        }

        // Without a listing no action can be safely chosen: loop-fatal.
        let controls = match env.driver.list_controls(env.target, LOCATE_DEPTH) {
            Ok(controls) => controls,
            Err(err) => {
                warn!(step, error = %err, "cannot list controls; stopping");
                logger.log(&StepLogEntry::new(step, "list_controls").with_error(format!("{err:#}")))?;
                outcome.passed = false;
                outcome.failures.push(RunFailure {
                    step,
                    reason: "Cannot list controls".to_string(),
                    details: Some(serde_json::json!({"error": format!("{err:#}")})),
                    screenshot: None,
                    snapshot: None,
                });
                outcome.stop = LoopStop::Failed;
                return Ok(());
            }
        };

        let screenshot = if policy.wants_screenshot() {
            capture_screenshot_quietly(env.capture, env.target, &session.screenshot_path(step))
        } else {
            None
        };

        let window_start = history.len().saturating_sub(options.history_window);
        let observation = Observation {
            step,
            max_steps: options.max_steps,
            controls: &controls,
            screenshot: screenshot.as_deref(),
            history: &history[window_start..],
        };

        // The decision source is a prerequisite for the step, like the
        // listing: if it errors the run cannot continue.
        let decision = match policy.decide(&observation) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(step, error = %err, "decision failed; stopping");
                logger.log(&StepLogEntry::new(step, "decide").with_error(format!("{err:#}")))?;
                outcome.passed = false;
                outcome.failures.push(RunFailure {
                    step,
                    reason: "Decision failed".to_string(),
                    details: Some(serde_json::json!({"error": format!("{err:#}")})),
                    screenshot: None,
                    snapshot: None,
                });
                outcome.stop = LoopStop::Failed;
                return Ok(());
            }
        };

        let (action, reasoning) = match decision {
            Decision::Done { reasoning } => {
                logger.log(&StepLogEntry::new(step, "done").with_result(
                    serde_json::json!({"reasoning": reasoning.clone()}),
                ))?;
                history.push(HistoryEntry {
                    step,
                    action: "done".to_string(),
                    selector: String::new(),
                    reasoning,
                    error: None,
                });
                outcome.stop = LoopStop::Done;
                return Ok(());
            }
            Decision::Act { action, reasoning } => (action, reasoning),
        };

        let selector_desc = action
            .selector()
            .map(|selector| selector.describe())
            .unwrap_or_default();

        // Destructive filter gates the step, not the run.
        if let Some(pattern) = filter.blocks(&action) {
            warn!(step, action = action.name(), pattern, "blocked by safety");
            recorder.record(action.clone());
            logger.log(
                &StepLogEntry::new(step, action.name())
                    .with_error(format!("blocked by safety (pattern {pattern:?})")),
            )?;
            history.push(HistoryEntry {
                step,
                action: action.name().to_string(),
                selector: selector_desc,
                reasoning,
                error: Some("blocked by safety".to_string()),
            });
            continue;
        }

        // Record before executing: a crash mid-execution must still leave a
        // replayable trail.
        recorder.record(action.clone());

        let ctx = ExecContext {
            driver: env.driver,
            capture: env.capture,
            target: env.target,
            screenshot_path: Some(session.screenshot_path(step)),
        };
        match execute_action(&ctx, &action) {
            Ok(effect) => {
                logger.log(
                    &StepLogEntry::new(step, action.name())
                        .with_result(serde_json::to_value(&effect)?),
                )?;
                history.push(HistoryEntry {
                    step,
                    action: action.name().to_string(),
                    selector: selector_desc,
                    reasoning,
                    error: None,
                });
            }
            Err(err) => {
                // Per-step failure; steps are independent.
                warn!(step, action = action.name(), error = %err, "step failed");
                logger.log(&StepLogEntry::new(step, action.name()).with_error(format!("{err:#}")))?;
                history.push(HistoryEntry {
                    step,
                    action: action.name().to_string(),
                    selector: selector_desc,
                    reasoning,
                    error: Some(format!("{err:#}")),
                });
            }
        }

        if options.oracle_interval > 0 && step % options.oracle_interval == 0 {
            let verdicts = run_all(env.driver, env.target, &options.invariants, &options.oracle);
            let failed: Vec<_> = verdicts.into_iter().filter(|verdict| verdict.failed).collect();
            if !failed.is_empty() {
                // Evidence is captured once per batch, attached to every
                // failed verdict.
                let (screenshot, snapshot) = capture_failure_evidence(env, session, step);
                for verdict in failed {
                    outcome.failures.push(RunFailure {
                        step,
                        reason: verdict.reason,
                        details: verdict.details,
                        screenshot: screenshot.clone(),
                        snapshot: snapshot.clone(),
                    });
                }
                outcome.passed = false;
                outcome.stop = LoopStop::Failed;
                return Ok(());
            }
        }

        if options.step_delay_ms > 0 {
            thread::sleep(Duration::from_millis(options.step_delay_ms));
        }
    }
}

/// Best-effort screenshot and tree snapshot for failure evidence.
fn capture_failure_evidence(
    env: &ExploreEnv<'_>,
    session: &Session,
    step: u32,
) -> (Option<std::path::PathBuf>, Option<std::path::PathBuf>) {
    let screenshot =
        capture_screenshot_quietly(env.capture, env.target, &session.screenshot_path(step));
    let snapshot = env
        .driver
        .list_controls(env.target, LOCATE_DEPTH)
        .ok()
        .and_then(|listing| {
            let path = session.snapshot_path(step);
            save_snapshot(&listing, &path).ok().map(|()| path)
        });
    (screenshot, snapshot)
}
