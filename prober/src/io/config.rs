//! Prober configuration stored under `.prober/state/config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::safety::{DestructiveFilter, SafetyConfig};
use crate::io::decider::DeciderConfig;
use crate::io::driver::BridgeConfig;
use crate::io::guard::GuardConfig;
use crate::io::paths::write_atomic;
use crate::io::target::TargetSpec;
use crate::oracles::{InvariantConfig, OracleConfig};
use crate::policy::ActionSpace;

/// Loop tuning for random/guided runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub step_delay_ms: u64,
    /// Run the oracle batch every N steps.
    pub oracle_interval: u32,
    /// How many recent steps the decider gets to see.
    pub history_window: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            seed: None,
            step_delay_ms: 100,
            oracle_interval: 5,
            history_window: 10,
        }
    }
}

/// Declarative target spec as it appears in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TargetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<PathBuf>,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_re: Option<String>,
}

impl TargetConfig {
    pub fn is_empty(&self) -> bool {
        self.pid.is_none()
            && self.process.is_none()
            && self.exe.is_none()
            && self.title_re.is_none()
    }

    /// First set field wins, in pid > process > exe > title order.
    pub fn to_spec(&self) -> Result<TargetSpec> {
        if let Some(pid) = self.pid {
            return Ok(TargetSpec::Pid(pid));
        }
        if let Some(process) = &self.process {
            return Ok(TargetSpec::ProcessName(process.clone()));
        }
        if let Some(exe) = &self.exe {
            return Ok(TargetSpec::ExecutablePath {
                exe: exe.clone(),
                args: self.args.clone(),
                cwd: self.cwd.clone(),
            });
        }
        if let Some(title_re) = &self.title_re {
            return Ok(TargetSpec::TitlePattern(title_re.clone()));
        }
        Err(crate::core::errors::ProbeError::ScenarioError(
            "no target specified (set pid, process, exe or title_re)".to_string(),
        )
        .into())
    }
}

/// Prober configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProbeConfig {
    pub target: TargetConfig,
    pub bridge: BridgeConfig,
    pub run: RunConfig,
    pub safety: SafetyConfig,
    pub guard: GuardConfig,
    pub oracle: OracleConfig,
    pub decider: DeciderConfig,
    pub action_space: ActionSpace,
    pub invariants: Vec<InvariantConfig>,
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run.max_steps == 0 {
            return Err(anyhow!("run.max_steps must be > 0"));
        }
        if self.run.oracle_interval == 0 {
            return Err(anyhow!("run.oracle_interval must be > 0"));
        }
        if self.bridge.command.is_empty() || self.bridge.command[0].trim().is_empty() {
            return Err(anyhow!("bridge.command must be a non-empty array"));
        }
        if self.bridge.timeout_secs == 0 {
            return Err(anyhow!("bridge.timeout_secs must be > 0"));
        }
        if self.bridge.output_limit_bytes == 0 {
            return Err(anyhow!("bridge.output_limit_bytes must be > 0"));
        }
        if self.oracle.responsive_timeout_ms == 0 {
            return Err(anyhow!("oracle.responsive_timeout_ms must be > 0"));
        }
        // Surface bad safety regexes at load time, not mid-run.
        DestructiveFilter::new(&self.safety).context("safety.destructive_patterns")?;
        for invariant in &self.invariants {
            if invariant.selector.is_empty() {
                return Err(anyhow!("invariants: selector must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ProbeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ProbeConfig> {
    if !path.exists() {
        let config = ProbeConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let contents = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: ProbeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, config: &ProbeConfig) -> Result<()> {
    config.validate()?;
    let mut buf = toml::to_string_pretty(config).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(config, ProbeConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut config = ProbeConfig::default();
        config.run.max_steps = 200;
        config.run.seed = Some(42);
        config.target.process = Some("Notepad.exe".to_string());

        write_config(&path, &config).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn zero_oracle_interval_is_rejected() {
        let mut config = ProbeConfig::default();
        config.run.oracle_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_safety_pattern_is_rejected() {
        let mut config = ProbeConfig::default();
        config.safety.destructive_patterns = vec!["(".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_invariant_selector_is_rejected() {
        let mut config = ProbeConfig::default();
        config.invariants.push(InvariantConfig {
            selector: crate::core::selector::Selector::default(),
            expect_present: true,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn target_config_precedence_is_pid_first() {
        let target = TargetConfig {
            pid: Some(10),
            process: Some("x".to_string()),
            ..TargetConfig::default()
        };
        assert_eq!(target.to_spec().expect("spec"), TargetSpec::Pid(10));

        let empty = TargetConfig::default();
        assert!(empty.is_empty());
        assert!(empty.to_spec().is_err());
    }
}
