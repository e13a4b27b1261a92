//! Stateless action execution against a located element.
//!
//! Every operation resolves its element through the selector priority over a
//! fresh tree snapshot, performs exactly one interaction, and returns a
//! structured [`ActionEffect`] describing what actually happened (a toggle
//! reports the resulting state, not just "done"). A rect-only selector
//! degrades to a coordinate click, whatever the requested operation — the
//! locator performed the click directly and has no element to hand over.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::core::errors::ProbeError;
use crate::core::selector::{Locate, Selector};
use crate::core::types::{Action, ActionEffect, ElementInfo, WaitCondition};
use crate::io::driver::{MAX_CONTROLS, ScreenCapture, UiDriver};
use crate::io::target::ResolvedTarget;

/// Snapshot depth used to resolve selectors.
pub const LOCATE_DEPTH: u32 = 4;
/// Polling interval for `wait_for`.
pub const WAIT_POLL_MS: u64 = 100;

/// Execution context for one step.
pub struct ExecContext<'a> {
    pub driver: &'a dyn UiDriver,
    pub capture: Option<&'a dyn ScreenCapture>,
    pub target: &'a ResolvedTarget,
    /// Where a `screenshot` action saves its image, when a capture
    /// collaborator is wired.
    pub screenshot_path: Option<PathBuf>,
}

enum Located {
    Element(ElementInfo),
    /// The locator already performed a center click; nothing to hand over.
    Clicked(i32, i32),
}

fn resolve(ctx: &ExecContext<'_>, selector: &Selector) -> Result<Located> {
    if selector.is_empty() {
        return Err(ProbeError::SelectorNotFound("empty selector".to_string()).into());
    }
    let listing = ctx.driver.list_controls(ctx.target, LOCATE_DEPTH)?;
    match selector.locate(&listing) {
        Locate::Found(element) => Ok(Located::Element(element.clone())),
        Locate::Coordinate(x, y) => {
            ctx.driver.click_at(ctx.target, x, y)?;
            Ok(Located::Clicked(x, y))
        }
        Locate::NotFound => {
            Err(ProbeError::SelectorNotFound(selector.describe()).into())
        }
    }
}

/// Execute one action and describe its effect.
pub fn execute_action(ctx: &ExecContext<'_>, action: &Action) -> Result<ActionEffect> {
    debug!(action = action.name(), "executing");
    match action {
        Action::Click { selector } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                ctx.driver.click(ctx.target, &element)?;
                Ok(ActionEffect::Clicked {
                    selector: selector.describe(),
                })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::TypeText {
            selector,
            text,
            clear,
        } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                ctx.driver.type_text(ctx.target, &element, text, *clear)?;
                Ok(ActionEffect::Typed {
                    selector: selector.describe(),
                    length: text.len(),
                })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::Toggle { selector, state } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                match state {
                    None => ctx.driver.toggle(ctx.target, &element)?,
                    Some(wanted) => {
                        let current = ctx.driver.toggle_state(ctx.target, &element)?;
                        if current != *wanted {
                            ctx.driver.toggle(ctx.target, &element)?;
                        }
                    }
                }
                let state = ctx.driver.toggle_state(ctx.target, &element)?;
                Ok(ActionEffect::Toggled { state })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::SelectCombo {
            selector,
            item_text,
        } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                ctx.driver.select_combo(ctx.target, &element, item_text)?;
                Ok(ActionEffect::Selected {
                    item: item_text.clone(),
                })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::ReadText { selector } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                let text = ctx.driver.read_text(ctx.target, &element)?;
                Ok(ActionEffect::Text { text })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::GetState { selector } => match resolve(ctx, selector)? {
            Located::Element(element) => {
                let state = ctx.driver.element_state(ctx.target, &element)?;
                Ok(ActionEffect::State { state })
            }
            Located::Clicked(x, y) => Ok(ActionEffect::ClickedAt { x, y }),
        },

        Action::WaitFor {
            selector,
            condition,
            timeout_ms,
        } => wait_for(ctx, selector, condition, *timeout_ms),

        Action::FocusWindow => {
            let title = ctx.driver.focus_window(ctx.target)?;
            Ok(ActionEffect::Focused { title })
        }

        Action::Screenshot => {
            let (Some(capture), Some(path)) = (ctx.capture, ctx.screenshot_path.as_deref()) else {
                return Err(ProbeError::ScenarioError(
                    "no screenshot collaborator wired".to_string(),
                )
                .into());
            };
            let saved = capture.capture(ctx.target, path)?;
            Ok(ActionEffect::Screenshot { path: saved })
        }

        Action::ListControls { depth } => {
            let mut controls = ctx.driver.list_controls(ctx.target, *depth)?;
            controls.truncate(MAX_CONTROLS);
            Ok(ActionEffect::Controls {
                count: controls.len(),
                controls,
            })
        }
    }
}

/// Poll until the condition holds or the timeout elapses.
///
/// A missing element keeps the poll going only for `exists`; any other
/// condition needs the element, so absence fails the wait immediately.
fn wait_for(
    ctx: &ExecContext<'_>,
    selector: &Selector,
    condition: &WaitCondition,
    timeout_ms: u64,
) -> Result<ActionEffect> {
    if selector.is_empty() {
        return Err(ProbeError::SelectorNotFound("empty selector".to_string()).into());
    }
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let listing = ctx.driver.list_controls(ctx.target, LOCATE_DEPTH)?;
        match selector.locate(&listing) {
            Locate::Found(element) => {
                if condition_holds(condition, element) {
                    return Ok(ActionEffect::ConditionMet {
                        condition: condition.describe(),
                    });
                }
            }
            Locate::Coordinate(_, _) | Locate::NotFound => {
                if !matches!(condition, WaitCondition::Exists) {
                    return Err(ProbeError::SelectorNotFound(selector.describe()).into());
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(ProbeError::Timeout {
                what: format!("wait_for({})", condition.describe()),
                timeout_ms,
            }
            .into());
        }
        thread::sleep(Duration::from_millis(WAIT_POLL_MS));
    }
}

fn condition_holds(condition: &WaitCondition, element: &ElementInfo) -> bool {
    match condition {
        WaitCondition::Exists => true,
        WaitCondition::Enabled { value } => element.enabled == *value,
        WaitCondition::Visible { value } => element.visible == *value,
        WaitCondition::TextEquals { value } => &element.name == value,
        WaitCondition::TextContains { value } => element.name.contains(value),
    }
}

/// Convenience used by evidence capture and the `controls` CLI command.
pub fn list_controls_bounded(
    driver: &dyn UiDriver,
    target: &ResolvedTarget,
    depth: u32,
) -> Result<Vec<ElementInfo>> {
    let mut controls = driver.list_controls(target, depth)?;
    controls.truncate(MAX_CONTROLS);
    Ok(controls)
}

/// Capture a screenshot for evidence, ignoring capture failures.
pub fn capture_screenshot_quietly(
    capture: Option<&dyn ScreenCapture>,
    target: &ResolvedTarget,
    path: &Path,
) -> Option<PathBuf> {
    capture.and_then(|capture| capture.capture(target, path).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{element, ScriptedDriver};

    fn target() -> ResolvedTarget {
        ResolvedTarget {
            pid: std::process::id(),
            process_name: "prober-test".to_string(),
            window_handle: None,
        }
    }

    fn ctx<'a>(driver: &'a ScriptedDriver, target: &'a ResolvedTarget) -> ExecContext<'a> {
        ExecContext {
            driver,
            capture: None,
            target,
            screenshot_path: None,
        }
    }

    fn by_id(automation_id: &str) -> Selector {
        Selector {
            automation_id: Some(automation_id.to_string()),
            ..Selector::default()
        }
    }

    #[test]
    fn click_resolves_and_reports_selector() {
        let driver = ScriptedDriver::default().with_listing(vec![element("save", "Save", "Button")]);
        let target = target();

        let effect = execute_action(
            &ctx(&driver, &target),
            &Action::Click {
                selector: by_id("save"),
            },
        )
        .expect("click");
        assert_eq!(
            effect,
            ActionEffect::Clicked {
                selector: "aid=save".to_string()
            }
        );
        assert!(driver.calls().iter().any(|call| call.starts_with("click ")));
    }

    #[test]
    fn empty_selector_is_rejected_outright() {
        let driver = ScriptedDriver::default().with_listing(vec![element("save", "Save", "Button")]);
        let target = target();

        let err = execute_action(
            &ctx(&driver, &target),
            &Action::Click {
                selector: Selector::default(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::SelectorNotFound(_))
        ));
        // No listing was even requested.
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn missing_element_is_selector_not_found() {
        let driver = ScriptedDriver::default().with_listing(vec![element("save", "Save", "Button")]);
        let target = target();

        let err = execute_action(
            &ctx(&driver, &target),
            &Action::Click {
                selector: by_id("discard"),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::SelectorNotFound(_))
        ));
    }

    #[test]
    fn rect_only_selector_click_falls_back_to_coordinates() {
        let driver = ScriptedDriver::default();
        let target = target();
        let selector = Selector {
            bounding_rect: Some(crate::core::types::Rect {
                left: 10,
                top: 10,
                right: 30,
                bottom: 20,
            }),
            ..Selector::default()
        };

        let effect = execute_action(&ctx(&driver, &target), &Action::Click { selector })
            .expect("coordinate click");
        assert_eq!(effect, ActionEffect::ClickedAt { x: 20, y: 15 });
        assert!(driver.calls().iter().any(|call| call == "click_at 20,15"));
    }

    #[test]
    fn toggle_reports_resulting_state() {
        let driver =
            ScriptedDriver::default().with_listing(vec![element("agree", "Agree", "CheckBox")]);
        let target = target();

        let effect = execute_action(
            &ctx(&driver, &target),
            &Action::Toggle {
                selector: by_id("agree"),
                state: None,
            },
        )
        .expect("toggle");
        assert_eq!(effect, ActionEffect::Toggled { state: true });
    }

    #[test]
    fn toggle_to_current_state_does_not_flip() {
        let driver =
            ScriptedDriver::default().with_listing(vec![element("agree", "Agree", "CheckBox")]);
        let target = target();

        // Already false; asking for false must not toggle.
        let effect = execute_action(
            &ctx(&driver, &target),
            &Action::Toggle {
                selector: by_id("agree"),
                state: Some(false),
            },
        )
        .expect("toggle");
        assert_eq!(effect, ActionEffect::Toggled { state: false });
        assert!(!driver.calls().iter().any(|call| call.starts_with("toggle ")));
    }

    #[test]
    fn wait_for_exists_succeeds_immediately() {
        let driver = ScriptedDriver::default().with_listing(vec![element("save", "Save", "Button")]);
        let target = target();

        let effect = execute_action(
            &ctx(&driver, &target),
            &Action::WaitFor {
                selector: by_id("save"),
                condition: WaitCondition::Exists,
                timeout_ms: 500,
            },
        )
        .expect("wait");
        assert_eq!(
            effect,
            ActionEffect::ConditionMet {
                condition: "exists".to_string()
            }
        );
    }

    #[test]
    fn wait_for_missing_element_times_out() {
        let driver = ScriptedDriver::default();
        let target = target();

        let err = execute_action(
            &ctx(&driver, &target),
            &Action::WaitFor {
                selector: by_id("ghost"),
                condition: WaitCondition::Exists,
                timeout_ms: 150,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::Timeout { .. })
        ));
    }

    #[test]
    fn wait_for_text_on_missing_element_fails_fast() {
        let driver = ScriptedDriver::default();
        let target = target();

        let err = execute_action(
            &ctx(&driver, &target),
            &Action::WaitFor {
                selector: by_id("ghost"),
                condition: WaitCondition::TextEquals {
                    value: "Ready".to_string(),
                },
                timeout_ms: 5_000,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::SelectorNotFound(_))
        ));
    }

    #[test]
    fn list_controls_is_bounded() {
        let listing: Vec<ElementInfo> = (0..600)
            .map(|i| element(&format!("e{i}"), "E", "Button"))
            .collect();
        let driver = ScriptedDriver::default().with_listing(listing);
        let target = target();

        let effect = execute_action(&ctx(&driver, &target), &Action::ListControls { depth: 4 })
            .expect("list");
        match effect {
            ActionEffect::Controls { count, .. } => assert_eq!(count, MAX_CONTROLS),
            other => panic!("expected Controls, got {other:?}"),
        }
    }
}
