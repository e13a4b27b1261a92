//! Selector values and pure element location over a tree listing.
//!
//! Matching priority, first satisfied source wins:
//!
//! 1. `automation_id` — exact match (most reliable).
//! 2. `name` and/or `control_type` — exact match on every given property.
//! 3. `index` — zero-based pick among the elements the prior criteria
//!    matched, in listing (pre-order) order.
//! 4. `bounding_rect` — center-coordinate click as a last resort; no element
//!    is returned.
//!
//! Ties between several `name`/`control_type` matches resolve to the first
//! pre-order match. Location is a result-type, not an error: an absent
//! element is an ordinary outcome, only the executor decides whether that is
//! fatal for the operation at hand.

use serde::{Deserialize, Serialize};

use crate::core::types::{ElementInfo, Rect};

/// Identifies one UI element via accessibility-tree properties.
///
/// Immutable value; purely descriptive. At least one discriminating field must
/// be set or the executor rejects the selector outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Selector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<Rect>,
}

/// Outcome of locating a selector inside a listing.
#[derive(Debug, Clone, PartialEq)]
pub enum Locate<'a> {
    /// A single element satisfied the criteria.
    Found(&'a ElementInfo),
    /// No property criteria were given; fall back to a coordinate click at
    /// the bounding-rect center.
    Coordinate(i32, i32),
    /// Criteria were given but nothing matched (or the index was out of
    /// range).
    NotFound,
}

impl Selector {
    /// Build a selector from a listed element, keeping only non-empty
    /// properties. Used by policies that pick elements from a listing.
    pub fn from_element(element: &ElementInfo) -> Self {
        Self {
            automation_id: non_empty(&element.automation_id),
            name: non_empty(&element.name),
            control_type: non_empty(&element.control_type),
            index: None,
            bounding_rect: None,
        }
    }

    /// True when no discriminating field at all is set.
    pub fn is_empty(&self) -> bool {
        self.automation_id.is_none()
            && self.name.is_none()
            && self.control_type.is_none()
            && self.index.is_none()
            && self.bounding_rect.is_none()
    }

    /// True when at least one property criterion (not just index/rect) is set.
    pub fn has_criteria(&self) -> bool {
        self.automation_id.is_some() || self.name.is_some() || self.control_type.is_some()
    }

    /// Compact human-readable description for logs and safety matching.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(aid) = &self.automation_id {
            parts.push(format!("aid={aid}"));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={name:?}"));
        }
        if let Some(control_type) = &self.control_type {
            parts.push(format!("type={control_type}"));
        }
        if let Some(index) = self.index {
            parts.push(format!("idx={index}"));
        }
        if parts.is_empty() {
            return "(empty selector)".to_string();
        }
        parts.join(", ")
    }

    /// Locate this selector inside a pre-order listing.
    pub fn locate<'a>(&self, listing: &'a [ElementInfo]) -> Locate<'a> {
        if let Some(automation_id) = &self.automation_id {
            let matches: Vec<&ElementInfo> = listing
                .iter()
                .filter(|element| &element.automation_id == automation_id)
                .collect();
            return self.pick(matches);
        }

        if self.name.is_some() || self.control_type.is_some() {
            let matches: Vec<&ElementInfo> = listing
                .iter()
                .filter(|element| {
                    self.name
                        .as_ref()
                        .is_none_or(|name| &element.name == name)
                        && self
                            .control_type
                            .as_ref()
                            .is_none_or(|control_type| &element.control_type == control_type)
                })
                .collect();
            return self.pick(matches);
        }

        if let Some(rect) = &self.bounding_rect {
            let (x, y) = rect.center();
            return Locate::Coordinate(x, y);
        }

        Locate::NotFound
    }

    fn pick<'a>(&self, matches: Vec<&'a ElementInfo>) -> Locate<'a> {
        let picked = match self.index {
            Some(index) => matches.get(index),
            None => matches.first(),
        };
        match picked {
            Some(element) => Locate::Found(element),
            None => Locate::NotFound,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(automation_id: &str, name: &str, control_type: &str) -> ElementInfo {
        ElementInfo {
            automation_id: automation_id.to_string(),
            name: name.to_string(),
            control_type: control_type.to_string(),
            enabled: true,
            visible: true,
            value: None,
            rect: None,
        }
    }

    /// automation_id strictly dominates: even with a conflicting `name`, the
    /// automation_id match wins.
    #[test]
    fn automation_id_dominates_conflicting_name() {
        let listing = vec![
            element("", "Save", "Button"),
            element("SaveButton", "Discard", "Button"),
        ];
        let selector = Selector {
            automation_id: Some("SaveButton".to_string()),
            name: Some("Save".to_string()),
            ..Selector::default()
        };

        match selector.locate(&listing) {
            Locate::Found(found) => assert_eq!(found.name, "Discard"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn name_and_control_type_must_both_match() {
        let listing = vec![
            element("", "OK", "Text"),
            element("", "OK", "Button"),
        ];
        let selector = Selector {
            name: Some("OK".to_string()),
            control_type: Some("Button".to_string()),
            ..Selector::default()
        };

        match selector.locate(&listing) {
            Locate::Found(found) => assert_eq!(found.control_type, "Button"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    /// Tie-break on several matches without an index: first pre-order match.
    #[test]
    fn tie_breaks_to_first_listing_order_match() {
        let listing = vec![
            element("row-1", "Item", "ListItem"),
            element("row-2", "Item", "ListItem"),
        ];
        let selector = Selector {
            name: Some("Item".to_string()),
            ..Selector::default()
        };

        match selector.locate(&listing) {
            Locate::Found(found) => assert_eq!(found.automation_id, "row-1"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn index_picks_among_matches() {
        let listing = vec![
            element("row-1", "Item", "ListItem"),
            element("row-2", "Item", "ListItem"),
            element("row-3", "Other", "ListItem"),
        ];
        let selector = Selector {
            name: Some("Item".to_string()),
            index: Some(1),
            ..Selector::default()
        };

        match selector.locate(&listing) {
            Locate::Found(found) => assert_eq!(found.automation_id, "row-2"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let listing = vec![element("row-1", "Item", "ListItem")];
        let selector = Selector {
            name: Some("Item".to_string()),
            index: Some(5),
            ..Selector::default()
        };
        assert_eq!(selector.locate(&listing), Locate::NotFound);
    }

    #[test]
    fn rect_only_falls_back_to_center_coordinate() {
        let selector = Selector {
            bounding_rect: Some(Rect {
                left: 0,
                top: 0,
                right: 100,
                bottom: 40,
            }),
            ..Selector::default()
        };
        assert_eq!(selector.locate(&[]), Locate::Coordinate(50, 20));
    }

    #[test]
    fn empty_selector_is_not_found() {
        let selector = Selector::default();
        assert!(selector.is_empty());
        assert_eq!(selector.locate(&[]), Locate::NotFound);
    }

    #[test]
    fn describe_renders_set_fields_only() {
        let selector = Selector {
            automation_id: Some("SaveButton".to_string()),
            index: Some(2),
            ..Selector::default()
        };
        assert_eq!(selector.describe(), "aid=SaveButton, idx=2");
        assert_eq!(Selector::default().describe(), "(empty selector)");
    }
}
