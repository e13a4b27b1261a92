//! Tree-listing snapshots for evidence and diff analysis.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::ElementInfo;

/// Persist a listing as pretty JSON evidence.
pub fn save_snapshot(listing: &[ElementInfo], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(listing).context("serialize snapshot")?;
    buf.push('\n');
    std::fs::write(path, buf).with_context(|| format!("write snapshot {}", path.display()))
}

pub fn load_snapshot(path: &Path) -> Result<Vec<ElementInfo>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse snapshot {}", path.display()))
}

/// Per-field change between two snapshots of the same element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangedElement {
    pub element: String,
    /// BTreeMap keeps the serialized diff deterministic.
    pub changes: BTreeMap<String, FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SnapshotDiff {
    pub added: Vec<ElementInfo>,
    pub removed: Vec<ElementInfo>,
    pub changed: Vec<ChangedElement>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

fn element_key(element: &ElementInfo) -> String {
    format!(
        "{}|{}|{}",
        element.automation_id, element.name, element.control_type
    )
}

/// Compare two listings keyed on identity properties, reporting additions,
/// removals and enabled/visible/value changes.
pub fn diff_snapshots(before: &[ElementInfo], after: &[ElementInfo]) -> SnapshotDiff {
    let before_map: BTreeMap<String, &ElementInfo> = before
        .iter()
        .map(|element| (element_key(element), element))
        .collect();
    let after_map: BTreeMap<String, &ElementInfo> = after
        .iter()
        .map(|element| (element_key(element), element))
        .collect();

    let added = after_map
        .iter()
        .filter(|(key, _)| !before_map.contains_key(*key))
        .map(|(_, element)| (*element).clone())
        .collect();
    let removed = before_map
        .iter()
        .filter(|(key, _)| !after_map.contains_key(*key))
        .map(|(_, element)| (*element).clone())
        .collect();

    let mut changed = Vec::new();
    for (key, old) in &before_map {
        let Some(new) = after_map.get(key) else {
            continue;
        };
        let mut changes = BTreeMap::new();
        if old.enabled != new.enabled {
            changes.insert(
                "enabled".to_string(),
                FieldChange {
                    before: serde_json::json!(old.enabled),
                    after: serde_json::json!(new.enabled),
                },
            );
        }
        if old.visible != new.visible {
            changes.insert(
                "visible".to_string(),
                FieldChange {
                    before: serde_json::json!(old.visible),
                    after: serde_json::json!(new.visible),
                },
            );
        }
        if old.value != new.value {
            changes.insert(
                "value".to_string(),
                FieldChange {
                    before: serde_json::json!(old.value),
                    after: serde_json::json!(new.value),
                },
            );
        }
        if !changes.is_empty() {
            changed.push(ChangedElement {
                element: key.clone(),
                changes,
            });
        }
    }

    SnapshotDiff {
        added,
        removed,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(automation_id: &str, value: Option<&str>, enabled: bool) -> ElementInfo {
        ElementInfo {
            automation_id: automation_id.to_string(),
            name: automation_id.to_string(),
            control_type: "Button".to_string(),
            enabled,
            visible: true,
            value: value.map(str::to_string),
            rect: None,
        }
    }

    #[test]
    fn diff_reports_added_removed_changed() {
        let before = vec![
            element("a", Some("1"), true),
            element("b", None, true),
        ];
        let after = vec![
            element("a", Some("2"), false),
            element("c", None, true),
        ];

        let diff = diff_snapshots(&before, &after);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].automation_id, "c");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].automation_id, "b");
        assert_eq!(diff.changed.len(), 1);
        let changes = &diff.changed[0].changes;
        assert!(changes.contains_key("enabled"));
        assert!(changes.contains_key("value"));
        assert!(!changes.contains_key("visible"));
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let listing = vec![element("a", None, true)];
        assert!(diff_snapshots(&listing, &listing).is_empty());
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tree").join("step-0001.json");
        let listing = vec![element("a", Some("v"), true)];

        save_snapshot(&listing, &path).expect("save");
        let loaded = load_snapshot(&path).expect("load");
        assert_eq!(loaded, listing);
    }
}
