//! Shared deterministic types for prober core logic.
//!
//! These types define stable contracts between components and the records the
//! evidence/ticket collaborators consume. They must stay plain and
//! serializable; none of them owns a live resource.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::selector::Selector;

/// Screen-space rectangle of an element or window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Center point, used for the coordinate-click fallback.
    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }
}

/// One element from a pre-order accessibility-tree listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ElementInfo {
    pub automation_id: String,
    pub name: String,
    pub control_type: String,
    pub enabled: bool,
    pub visible: bool,
    pub value: Option<String>,
    pub rect: Option<Rect>,
}

/// One top-level window from a desktop enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub pid: u32,
    #[serde(default)]
    pub handle: Option<u64>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub rect: Option<Rect>,
}

/// Point-in-time state of a located element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ElementState {
    pub enabled: bool,
    pub visible: bool,
    pub value: Option<String>,
    pub selected: Option<bool>,
    pub rect: Option<Rect>,
}

/// Condition polled by `wait_for`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum WaitCondition {
    Exists,
    Enabled { value: bool },
    Visible { value: bool },
    TextEquals { value: String },
    TextContains { value: String },
}

impl WaitCondition {
    pub fn describe(&self) -> String {
        match self {
            WaitCondition::Exists => "exists".to_string(),
            WaitCondition::Enabled { value } => format!("enabled={value}"),
            WaitCondition::Visible { value } => format!("visible={value}"),
            WaitCondition::TextEquals { value } => format!("text_equals={value:?}"),
            WaitCondition::TextContains { value } => format!("text_contains={value:?}"),
        }
    }
}

fn default_clear() -> bool {
    true
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_depth() -> u32 {
    4
}

/// One primitive UI operation, with strongly-typed arguments per variant.
///
/// This is the replay/minimization unit: the serialized form is what
/// `actions.json` stores and what the decision collaborator emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click {
        selector: Selector,
    },
    TypeText {
        selector: Selector,
        #[serde(default)]
        text: String,
        #[serde(default = "default_clear")]
        clear: bool,
    },
    Toggle {
        selector: Selector,
        #[serde(default)]
        state: Option<bool>,
    },
    SelectCombo {
        selector: Selector,
        #[serde(default)]
        item_text: String,
    },
    ReadText {
        selector: Selector,
    },
    GetState {
        selector: Selector,
    },
    WaitFor {
        selector: Selector,
        #[serde(flatten)]
        condition: WaitCondition,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
    },
    FocusWindow,
    Screenshot,
    ListControls {
        #[serde(default = "default_depth")]
        depth: u32,
    },
}

impl Action {
    /// Wire name of the action, matching the serialized `action` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::TypeText { .. } => "type_text",
            Action::Toggle { .. } => "toggle",
            Action::SelectCombo { .. } => "select_combo",
            Action::ReadText { .. } => "read_text",
            Action::GetState { .. } => "get_state",
            Action::WaitFor { .. } => "wait_for",
            Action::FocusWindow => "focus_window",
            Action::Screenshot => "screenshot",
            Action::ListControls { .. } => "list_controls",
        }
    }

    /// Selector the action operates on, if any.
    pub fn selector(&self) -> Option<&Selector> {
        match self {
            Action::Click { selector }
            | Action::TypeText { selector, .. }
            | Action::Toggle { selector, .. }
            | Action::SelectCombo { selector, .. }
            | Action::ReadText { selector }
            | Action::GetState { selector }
            | Action::WaitFor { selector, .. } => Some(selector),
            Action::FocusWindow | Action::Screenshot | Action::ListControls { .. } => None,
        }
    }
}

/// Append-only record of one action, written before the action executes so a
/// crash mid-execution still leaves a replayable trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub step: u32,
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub timestamp_ms: u64,
}

/// Structured result describing the effect of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ActionEffect {
    Clicked { selector: String },
    ClickedAt { x: i32, y: i32 },
    Typed { selector: String, length: usize },
    Toggled { state: bool },
    Selected { item: String },
    Text { text: String },
    State { state: ElementState },
    ConditionMet { condition: String },
    Focused { title: String },
    Screenshot { path: PathBuf },
    Controls { count: usize, controls: Vec<ElementInfo> },
}

/// Health-check verdict, produced fresh each oracle pass and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub failed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OracleVerdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            failed: false,
            reason: reason.into(),
            details: None,
        }
    }

    pub fn fail(reason: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            failed: true,
            reason: reason.into(),
            details,
        }
    }
}

/// One recorded failure from a run, with any captured evidence handles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub step: u32,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

/// Why the exploration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStop {
    /// The policy signalled completion.
    Done,
    /// An oracle batch reported at least one failed verdict, or the element
    /// listing needed to choose the next action could not be produced.
    Failed,
    /// The step budget was exhausted.
    BudgetExhausted,
}

/// Result object for one exploration run, serializable for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub session_id: String,
    pub steps_run: u32,
    pub failures: Vec<RunFailure>,
    pub passed: bool,
    /// Seed that produced the run (random policy only), for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub stop: LoopStop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_tagged_json() {
        let action = Action::TypeText {
            selector: Selector {
                automation_id: Some("NameBox".to_string()),
                ..Selector::default()
            },
            text: "hello".to_string(),
            clear: false,
        };
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["action"], "type_text");
        assert_eq!(json["selector"]["automation_id"], "NameBox");

        let back: Action = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, action);
    }

    #[test]
    fn wait_condition_flattens_into_record() {
        let record = ActionRecord {
            step: 3,
            action: Action::WaitFor {
                selector: Selector::default(),
                condition: WaitCondition::TextContains {
                    value: "Saved".to_string(),
                },
                timeout_ms: 2_000,
            },
            timestamp_ms: 0,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["action"], "wait_for");
        assert_eq!(json["condition"], "text_contains");
        assert_eq!(json["value"], "Saved");
        assert_eq!(json["timeout_ms"], 2_000);
    }

    #[test]
    fn unknown_action_tag_fails_to_parse() {
        let raw = r#"{"step": 1, "action": "explode", "timestamp_ms": 0}"#;
        assert!(serde_json::from_str::<ActionRecord>(raw).is_err());
    }

    #[test]
    fn rect_center_is_midpoint() {
        let rect = Rect {
            left: 10,
            top: 20,
            right: 110,
            bottom: 60,
        };
        assert_eq!(rect.center(), (60, 40));
    }
}
