//! Automated UI exploration and fault-isolation driver.
//!
//! Thin CLI over the prober library: resolves a target application, then
//! replays, explores (random or guided), minimizes failing sequences, and
//! manages the human-interruption pause flag.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use prober::actions::list_controls_bounded;
use prober::core::errors::ProbeError;
use prober::core::minimize::MinimizeOptions;
use prober::core::types::RunOutcome;
use prober::exit_codes;
use prober::explore::{ExploreEnv, ExploreOptions, run_explore};
use prober::io::config::{ProbeConfig, TargetConfig, load_config};
use prober::io::decider::GuidedPolicy;
use prober::io::driver::{BridgeDriver, DEFAULT_DEPTH, UiDriver};
use prober::io::guard::{clear_pause, pause_info};
use prober::io::launched::{is_launched, remove_launched};
use prober::io::paths::ProberPaths;
use prober::io::session::Session;
use prober::io::target::TargetRegistry;
use prober::policy::{RandomPolicy, ReplayPolicy};
use prober::replay::{load_actions, minimize_recorded, save_actions};

#[derive(Parser)]
#[command(
    name = "prober",
    version,
    about = "Automated UI exploration and fault-isolation driver"
)]
struct Cli {
    /// Working root holding `.prober/` (defaults to the current directory).
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Target selection flags, overriding `[target]` in config.
#[derive(Args, Default)]
struct TargetArgs {
    /// Attach to an already-running process by pid.
    #[arg(long)]
    pid: Option<u32>,
    /// Attach by case-insensitive process name (first match wins).
    #[arg(long)]
    process: Option<String>,
    /// Launch this executable and attach to it.
    #[arg(long)]
    exe: Option<PathBuf>,
    /// Arguments for --exe.
    #[arg(long)]
    args: Vec<String>,
    /// Working directory for --exe.
    #[arg(long)]
    cwd: Option<PathBuf>,
    /// Attach to the first window whose title matches this pattern.
    #[arg(long)]
    title_re: Option<String>,
}

impl TargetArgs {
    fn to_config(&self) -> TargetConfig {
        TargetConfig {
            pid: self.pid,
            process: self.process.clone(),
            exe: self.exe.clone(),
            args: self.args.clone(),
            cwd: self.cwd.clone(),
            title_re: self.title_re.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a target and print its registry id and process info.
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List top-level windows visible to the bridge.
    Windows,
    /// List the target's controls to a bounded depth.
    Controls {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value_t = DEFAULT_DEPTH)]
        depth: u32,
    },
    /// Replay a recorded action sequence against the target.
    Replay {
        #[command(flatten)]
        target: TargetArgs,
        /// Recorded actions file (actions.json).
        actions: PathBuf,
    },
    /// Run a seeded random exploration.
    Random {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// Run an externally guided exploration.
    Explore {
        #[command(flatten)]
        target: TargetArgs,
        /// Exploration goal passed to the decider.
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        max_steps: Option<u32>,
    },
    /// Reduce a failing recorded sequence to a minimal reproducer.
    Minimize {
        #[command(flatten)]
        target: TargetArgs,
        /// Recorded actions file (actions.json).
        actions: PathBuf,
        /// Where to write the minimized sequence.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Close a target that the prober launched itself.
    Close {
        #[command(flatten)]
        target: TargetArgs,
        /// Confirm the close (required when safety.require_double_confirm).
        #[arg(long)]
        yes: bool,
    },
    /// Clear the human-interruption pause flag.
    Resume,
}

fn main() {
    prober::logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            match err.downcast_ref::<ProbeError>() {
                Some(ProbeError::UserInterrupt(_)) => exit_codes::INTERRUPTED,
                _ => exit_codes::INVALID,
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = ProberPaths::new(&cli.root);
    paths.ensure_dirs()?;
    let config = load_config(&paths.config_path)?;
    let driver = BridgeDriver::new(config.bridge.clone());
    let registry = TargetRegistry::new();

    match cli.command {
        Command::Resolve { target } => {
            let spec = pick_target(&target, &config)?;
            let (target_id, resolved) = registry.resolve(&spec, &driver, &paths)?;
            print_json(&serde_json::json!({
                "target_id": target_id,
                "pid": resolved.pid,
                "process_name": resolved.process_name,
                "alive": resolved.is_alive(),
            }))?;
            Ok(exit_codes::OK)
        }

        Command::Windows => {
            let windows = driver.list_windows()?;
            print_json(&windows)?;
            Ok(exit_codes::OK)
        }

        Command::Controls { target, depth } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            let controls = list_controls_bounded(&driver, &resolved, depth)?;
            print_json(&controls)?;
            Ok(exit_codes::OK)
        }

        Command::Replay { target, actions } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            let records = load_actions(&actions)?;
            let env = explore_env(&driver, &paths, &resolved);
            let mut options = explore_options(&config);
            options.max_steps = records.len() as u32 + 1;
            let mut session = Session::new(&paths);
            let mut policy = ReplayPolicy::new(records);
            let outcome = run_explore(&env, &mut session, &mut policy, &options)?;
            finish_run(&outcome)
        }

        Command::Random {
            target,
            seed,
            max_steps,
        } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            let env = explore_env(&driver, &paths, &resolved);
            let mut options = explore_options(&config);
            if let Some(max_steps) = max_steps {
                options.max_steps = max_steps;
            }
            let seed = seed.or(config.run.seed);
            let mut session = Session::new(&paths);
            let mut policy = RandomPolicy::new(config.action_space.clone(), seed);
            let outcome = run_explore(&env, &mut session, &mut policy, &options)?;
            finish_run(&outcome)
        }

        Command::Explore {
            target,
            goal,
            max_steps,
        } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            let env = explore_env(&driver, &paths, &resolved);
            let mut options = explore_options(&config);
            if let Some(max_steps) = max_steps {
                options.max_steps = max_steps;
            }
            let mut decider_config = config.decider.clone();
            if let Some(goal) = goal {
                decider_config.goal = goal;
            }
            if decider_config.command.is_empty() {
                return Err(ProbeError::ScenarioError(
                    "explore requires decider.command in config".to_string(),
                )
                .into());
            }
            let mut session = Session::new(&paths);
            let mut policy = GuidedPolicy::new(decider_config)?;
            let outcome = run_explore(&env, &mut session, &mut policy, &options)?;
            finish_run(&outcome)
        }

        Command::Minimize {
            target,
            actions,
            out,
        } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            let records = load_actions(&actions)?;
            let env = explore_env(&driver, &paths, &resolved);
            // Candidate replays check oracles after the fact, not per step.
            let mut options = explore_options(&config);
            options.oracle_interval = 0;
            let minimized =
                minimize_recorded(&env, &records, &options, &MinimizeOptions::default());
            let out = out.unwrap_or_else(|| actions.with_extension("min.json"));
            save_actions(&out, &minimized)?;
            print_json(&serde_json::json!({
                "input_len": records.len(),
                "output_len": minimized.len(),
                "out": out,
            }))?;
            Ok(exit_codes::OK)
        }

        Command::Close { target, yes } => {
            let spec = pick_target(&target, &config)?;
            let (_, resolved) = registry.resolve(&spec, &driver, &paths)?;
            if !is_launched(&paths.launched_path, resolved.pid) {
                return Err(ProbeError::SafetyViolation(format!(
                    "refusing to close pid {}: not launched by prober",
                    resolved.pid
                ))
                .into());
            }
            if config.safety.require_double_confirm && !yes {
                return Err(ProbeError::SafetyViolation(
                    "close requires --yes (safety.require_double_confirm is set)".to_string(),
                )
                .into());
            }
            driver.close_window(&resolved)?;
            remove_launched(&paths.launched_path, resolved.pid)?;
            print_json(&serde_json::json!({
                "closed": true,
                "pid": resolved.pid,
            }))?;
            Ok(exit_codes::OK)
        }

        Command::Resume => {
            let info = pause_info(&paths);
            let existed = clear_pause(&paths)?;
            print_json(&serde_json::json!({
                "cleared": existed,
                "pause_info": info,
            }))?;
            Ok(exit_codes::OK)
        }
    }
}

fn pick_target(args: &TargetArgs, config: &ProbeConfig) -> Result<prober::io::target::TargetSpec> {
    let from_args = args.to_config();
    if from_args.is_empty() {
        config.target.to_spec()
    } else {
        from_args.to_spec()
    }
}

fn explore_env<'a>(
    driver: &'a BridgeDriver,
    paths: &'a ProberPaths,
    target: &'a prober::io::target::ResolvedTarget,
) -> ExploreEnv<'a> {
    ExploreEnv {
        driver,
        capture: Some(driver),
        sampler: Some(driver),
        paths,
        target,
    }
}

fn explore_options(config: &ProbeConfig) -> ExploreOptions {
    ExploreOptions {
        max_steps: config.run.max_steps,
        step_delay_ms: config.run.step_delay_ms,
        oracle_interval: config.run.oracle_interval,
        history_window: config.run.history_window,
        safety: config.safety.clone(),
        guard: config.guard.clone(),
        oracle: config.oracle.clone(),
        invariants: config.invariants.clone(),
    }
}

fn finish_run(outcome: &RunOutcome) -> Result<i32> {
    print_json(outcome)?;
    if outcome.passed {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILED)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}
