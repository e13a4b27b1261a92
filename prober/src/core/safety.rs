//! Destructive-action classification.
//!
//! The filter builds a lowercase string from the action name plus its selector
//! description and text arguments, and matches it against the configured
//! regex patterns. Blocking is a policy decision (`allow_destructive`), the
//! classification itself never changes with policy.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::ProbeError;
use crate::core::types::Action;

/// Safety policy, read-only during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub allow_destructive: bool,
    pub destructive_patterns: Vec<String>,
    pub require_double_confirm: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allow_destructive: false,
            destructive_patterns: [
                "delete", "remove", "drop", "exit", "quit", "close", "shutdown",
            ]
            .iter()
            .map(|pattern| (*pattern).to_string())
            .collect(),
            require_double_confirm: true,
        }
    }
}

/// Compiled destructive-action filter.
pub struct DestructiveFilter {
    patterns: Vec<Regex>,
    allow_destructive: bool,
}

impl DestructiveFilter {
    pub fn new(config: &SafetyConfig) -> Result<Self> {
        let patterns = config
            .destructive_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("compile safety pattern {pattern:?}"))
            })
            .collect::<Result<Vec<Regex>>>()?;
        Ok(Self {
            patterns,
            allow_destructive: config.allow_destructive,
        })
    }

    /// First configured pattern matching the action's description, if any.
    /// Classification only; ignores `allow_destructive`.
    pub fn is_destructive(&self, action: &Action) -> Option<&str> {
        let description = action_description(action);
        self.patterns
            .iter()
            .find(|pattern| pattern.is_match(&description))
            .map(|pattern| pattern.as_str())
    }

    /// Pattern that blocks this action under the current policy, if any.
    pub fn blocks(&self, action: &Action) -> Option<&str> {
        if self.allow_destructive {
            return None;
        }
        self.is_destructive(action)
    }

    /// Fail with `SafetyViolation` when the action is blocked.
    pub fn check(&self, action: &Action) -> Result<()> {
        if let Some(pattern) = self.blocks(action) {
            return Err(ProbeError::SafetyViolation(format!(
                "action={}, selector={:?} matched pattern={:?}; set allow_destructive=true to permit",
                action.name(),
                action.selector().map(|s| s.describe()).unwrap_or_default(),
                pattern,
            ))
            .into());
        }
        Ok(())
    }
}

/// Lowercase matching text for an action: name, selector description and any
/// text arguments.
pub fn action_description(action: &Action) -> String {
    let mut description = action.name().to_string();
    if let Some(selector) = action.selector() {
        description.push(' ');
        description.push_str(&selector.describe());
    }
    match action {
        Action::TypeText { text, .. } => {
            description.push(' ');
            description.push_str(text);
        }
        Action::SelectCombo { item_text, .. } => {
            description.push(' ');
            description.push_str(item_text);
        }
        _ => {}
    }
    description.to_lowercase()
}
