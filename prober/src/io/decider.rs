//! Externally guided decision policy.
//!
//! The decider is an opaque collaborator command: it receives the current
//! observation (screenshot handle, control list, recent history) as JSON and
//! answers with one action. A reply that names no usable action is treated
//! as "done" — the collaborator never gets to wedge the loop.

use std::time::Duration;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::selector::Selector;
use crate::core::types::{Action, ElementInfo};
use crate::io::bridge::call_json;
use crate::policy::{Decision, DecisionPolicy, Observation};

const DECIDER_TEMPLATE: &str = include_str!("prompts/decider.md");

/// Decider command configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeciderConfig {
    /// Command to execute for decisions (e.g. `["prober-decider"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Optional exploration goal woven into the instructions.
    pub goal: String,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 1_000_000,
            goal: String::new(),
        }
    }
}

/// Policy that delegates each decision to the configured collaborator.
pub struct GuidedPolicy {
    config: DeciderConfig,
    instructions: String,
}

impl GuidedPolicy {
    pub fn new(config: DeciderConfig) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("decider", DECIDER_TEMPLATE)
            .context("decider template should be valid")?;
        let instructions = env
            .get_template("decider")?
            .render(context! {
                goal => (!config.goal.trim().is_empty()).then(|| config.goal.trim()),
            })
            .context("render decider instructions")?;
        Ok(Self {
            config,
            instructions,
        })
    }
}

impl DecisionPolicy for GuidedPolicy {
    fn decide(&mut self, observation: &Observation<'_>) -> Result<Decision> {
        let payload = serde_json::json!({
            "instructions": self.instructions,
            "step": observation.step,
            "max_steps": observation.max_steps,
            "screenshot": observation.screenshot,
            "controls": summarize_controls(observation.controls),
            "history": observation.history,
        });

        let reply = call_json(
            &self.config.command,
            &payload,
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        )?;
        debug!(step = observation.step, "decider replied");
        Ok(parse_decision(&reply))
    }

    fn wants_screenshot(&self) -> bool {
        true
    }
}

/// Trim a listing to the identity/interaction properties the decider needs,
/// dropping empty fields to keep the payload small.
fn summarize_controls(controls: &[ElementInfo]) -> Vec<serde_json::Value> {
    controls
        .iter()
        .filter_map(|control| {
            let mut entry = serde_json::Map::new();
            if !control.automation_id.is_empty() {
                entry.insert("automation_id".to_string(), control.automation_id.clone().into());
            }
            if !control.name.is_empty() {
                entry.insert("name".to_string(), control.name.clone().into());
            }
            if !control.control_type.is_empty() {
                entry.insert("control_type".to_string(), control.control_type.clone().into());
            }
            if entry.is_empty() {
                return None;
            }
            entry.insert("enabled".to_string(), control.enabled.into());
            Some(serde_json::Value::Object(entry))
        })
        .collect()
}

/// Interpret a collaborator reply, degrading to `Done` whenever it is
/// unusable.
pub(crate) fn parse_decision(reply: &serde_json::Value) -> Decision {
    let reasoning = reply["reasoning"].as_str().map(str::to_string);

    if reply["done"].as_bool() == Some(true) {
        return Decision::Done { reasoning };
    }

    let action_name = reply["action"].as_str().unwrap_or("done");
    if action_name == "done" {
        return Decision::Done { reasoning };
    }

    let selector: Selector = serde_json::from_value(reply["selector"].clone()).unwrap_or_default();
    let text = reply["text"].as_str().unwrap_or_default().to_string();

    let action = match action_name {
        "click" => Action::Click { selector },
        "type_text" => Action::TypeText {
            selector,
            text,
            clear: true,
        },
        "toggle" => Action::Toggle {
            selector,
            state: None,
        },
        "select_combo" => Action::SelectCombo {
            selector,
            item_text: text,
        },
        "read_text" => Action::ReadText { selector },
        other => {
            warn!(action = other, "decider chose an unknown action; treating as done");
            return Decision::Done { reasoning };
        }
    };

    Decision::Act { action, reasoning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_include_goal_when_set() {
        let policy = GuidedPolicy::new(DeciderConfig {
            goal: "exercise the settings dialog".to_string(),
            ..DeciderConfig::default()
        })
        .expect("policy");
        assert!(policy.instructions.contains("exercise the settings dialog"));

        let bare = GuidedPolicy::new(DeciderConfig::default()).expect("policy");
        assert!(!bare.instructions.contains("Goal:"));
    }

    #[test]
    fn parse_click_reply() {
        let reply = serde_json::json!({
            "action": "click",
            "selector": {"automation_id": "SaveButton"},
            "reasoning": "save looks untested",
        });
        match parse_decision(&reply) {
            Decision::Act { action, reasoning } => {
                assert_eq!(action.name(), "click");
                assert_eq!(
                    action.selector().and_then(|s| s.automation_id.clone()),
                    Some("SaveButton".to_string())
                );
                assert_eq!(reasoning.as_deref(), Some("save looks untested"));
            }
            other => panic!("expected Act, got {other:?}"),
        }
    }

    #[test]
    fn done_flag_wins_over_action() {
        let reply = serde_json::json!({
            "action": "click",
            "selector": {},
            "done": true,
        });
        assert!(matches!(parse_decision(&reply), Decision::Done { .. }));
    }

    #[test]
    fn unusable_reply_degrades_to_done() {
        assert!(matches!(
            parse_decision(&serde_json::json!({})),
            Decision::Done { .. }
        ));
        assert!(matches!(
            parse_decision(&serde_json::json!({"action": "levitate", "selector": {}})),
            Decision::Done { .. }
        ));
    }

    #[test]
    fn type_text_carries_text_argument() {
        let reply = serde_json::json!({
            "action": "type_text",
            "selector": {"name": "Name"},
            "text": "Alice",
        });
        match parse_decision(&reply) {
            Decision::Act { action, .. } => match action {
                Action::TypeText { text, clear, .. } => {
                    assert_eq!(text, "Alice");
                    assert!(clear);
                }
                other => panic!("expected TypeText, got {other:?}"),
            },
            other => panic!("expected Act, got {other:?}"),
        }
    }
}
