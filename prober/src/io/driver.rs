//! Accessibility-backend abstraction.
//!
//! The [`UiDriver`] trait decouples element location, action execution and
//! oracles from the platform accessibility API. Production use goes through
//! [`BridgeDriver`], which shells out to a configured bridge command speaking
//! JSON over stdin/stdout; tests use scripted drivers that return
//! predetermined listings without touching a desktop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{ElementInfo, ElementState, WindowInfo};
use crate::io::bridge::call_json;
use crate::io::guard::PointerSampler;
use crate::io::target::ResolvedTarget;

/// Hard cap on elements returned by a listing, bounding memory and
/// serialization cost.
pub const MAX_CONTROLS: usize = 500;
/// Default traversal depth for listings.
pub const DEFAULT_DEPTH: u32 = 4;

/// Synchronous operations against a target's accessibility tree.
///
/// Every call may block on the target application; implementations must bound
/// each call with a timeout.
pub trait UiDriver {
    /// Enumerate all top-level windows on the desktop.
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Pre-order listing of the target's tree, bounded by `depth` and capped
    /// at [`MAX_CONTROLS`].
    fn list_controls(&self, target: &ResolvedTarget, depth: u32) -> Result<Vec<ElementInfo>>;

    fn click(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<()>;

    /// Raw coordinate click, used by the bounding-rect selector fallback.
    fn click_at(&self, target: &ResolvedTarget, x: i32, y: i32) -> Result<()>;

    fn type_text(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
        text: &str,
        clear: bool,
    ) -> Result<()>;

    /// Flip a toggleable element once.
    fn toggle(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<()>;

    /// Read the current toggle state.
    fn toggle_state(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<bool>;

    fn select_combo(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
        item_text: &str,
    ) -> Result<()>;

    fn read_text(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<String>;

    fn element_state(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
    ) -> Result<ElementState>;

    /// Bring the target's main window to the foreground; returns its title.
    fn focus_window(&self, target: &ResolvedTarget) -> Result<String>;

    /// Ask the target's main window to close. Callers gate this to
    /// self-launched processes; see the launched-pid registry.
    fn close_window(&self, target: &ResolvedTarget) -> Result<()>;
}

/// Opaque screenshot collaborator. The prober only needs a stable handle
/// (path) to attach to failure evidence.
pub trait ScreenCapture {
    fn capture(&self, target: &ResolvedTarget, save_path: &Path) -> Result<PathBuf>;
}

/// Bridge command configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Command to execute for bridge exchanges (e.g. `["prober-bridge"]`).
    pub command: Vec<String>,
    /// Per-exchange timeout.
    pub timeout_secs: u64,
    /// Truncate bridge output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: vec!["prober-bridge".to_string()],
            timeout_secs: 10,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Driver that shells out to the configured accessibility bridge.
pub struct BridgeDriver {
    config: BridgeConfig,
}

impl BridgeDriver {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    fn call(&self, payload: serde_json::Value) -> Result<serde_json::Value> {
        debug!(op = %payload["op"], "bridge exchange");
        let reply = call_json(
            &self.config.command,
            &payload,
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        )?;
        if reply["ok"].as_bool() != Some(true) {
            let message = reply["error"].as_str().unwrap_or("bridge call failed");
            return Err(anyhow!("bridge {}: {}", payload["op"], message));
        }
        Ok(reply)
    }

    fn element_payload(element: &ElementInfo) -> serde_json::Value {
        serde_json::json!({
            "automation_id": element.automation_id,
            "name": element.name,
            "control_type": element.control_type,
        })
    }
}

impl UiDriver for BridgeDriver {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let reply = self.call(serde_json::json!({"op": "list_windows"}))?;
        let windows: Vec<WindowInfo> = serde_json::from_value(reply["windows"].clone())
            .map_err(|err| anyhow!("bridge list_windows: malformed reply: {err}"))?;
        Ok(windows)
    }

    fn list_controls(&self, target: &ResolvedTarget, depth: u32) -> Result<Vec<ElementInfo>> {
        let reply = self.call(serde_json::json!({
            "op": "list_controls",
            "pid": target.pid,
            "depth": depth,
        }))?;
        let mut controls: Vec<ElementInfo> = serde_json::from_value(reply["controls"].clone())
            .map_err(|err| anyhow!("bridge list_controls: malformed reply: {err}"))?;
        controls.truncate(MAX_CONTROLS);
        Ok(controls)
    }

    fn click(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<()> {
        self.call(serde_json::json!({
            "op": "click",
            "pid": target.pid,
            "element": Self::element_payload(element),
        }))?;
        Ok(())
    }

    fn click_at(&self, target: &ResolvedTarget, x: i32, y: i32) -> Result<()> {
        self.call(serde_json::json!({
            "op": "click_at",
            "pid": target.pid,
            "x": x,
            "y": y,
        }))?;
        Ok(())
    }

    fn type_text(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
        text: &str,
        clear: bool,
    ) -> Result<()> {
        self.call(serde_json::json!({
            "op": "type_text",
            "pid": target.pid,
            "element": Self::element_payload(element),
            "text": text,
            "clear": clear,
        }))?;
        Ok(())
    }

    fn toggle(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<()> {
        self.call(serde_json::json!({
            "op": "toggle",
            "pid": target.pid,
            "element": Self::element_payload(element),
        }))?;
        Ok(())
    }

    fn toggle_state(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<bool> {
        let reply = self.call(serde_json::json!({
            "op": "toggle_state",
            "pid": target.pid,
            "element": Self::element_payload(element),
        }))?;
        reply["state"]
            .as_bool()
            .ok_or_else(|| anyhow!("bridge toggle_state: missing state"))
    }

    fn select_combo(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
        item_text: &str,
    ) -> Result<()> {
        self.call(serde_json::json!({
            "op": "select_combo",
            "pid": target.pid,
            "element": Self::element_payload(element),
            "item_text": item_text,
        }))?;
        Ok(())
    }

    fn read_text(&self, target: &ResolvedTarget, element: &ElementInfo) -> Result<String> {
        let reply = self.call(serde_json::json!({
            "op": "read_text",
            "pid": target.pid,
            "element": Self::element_payload(element),
        }))?;
        Ok(reply["text"].as_str().unwrap_or_default().to_string())
    }

    fn element_state(
        &self,
        target: &ResolvedTarget,
        element: &ElementInfo,
    ) -> Result<ElementState> {
        let reply = self.call(serde_json::json!({
            "op": "element_state",
            "pid": target.pid,
            "element": Self::element_payload(element),
        }))?;
        serde_json::from_value(reply["state"].clone())
            .map_err(|err| anyhow!("bridge element_state: malformed reply: {err}"))
    }

    fn focus_window(&self, target: &ResolvedTarget) -> Result<String> {
        let reply = self.call(serde_json::json!({
            "op": "focus_window",
            "pid": target.pid,
        }))?;
        Ok(reply["title"].as_str().unwrap_or_default().to_string())
    }

    fn close_window(&self, target: &ResolvedTarget) -> Result<()> {
        self.call(serde_json::json!({
            "op": "close_window",
            "pid": target.pid,
        }))?;
        Ok(())
    }
}

impl ScreenCapture for BridgeDriver {
    fn capture(&self, target: &ResolvedTarget, save_path: &Path) -> Result<PathBuf> {
        self.call(serde_json::json!({
            "op": "screenshot",
            "pid": target.pid,
            "save_path": save_path,
        }))?;
        Ok(save_path.to_path_buf())
    }
}

impl PointerSampler for BridgeDriver {
    fn cursor_pos(&self) -> Result<(i32, i32)> {
        let reply = self.call(serde_json::json!({"op": "cursor_pos"}))?;
        let x = reply["x"].as_i64().ok_or_else(|| anyhow!("bridge cursor_pos: missing x"))?;
        let y = reply["y"].as_i64().ok_or_else(|| anyhow!("bridge cursor_pos: missing y"))?;
        Ok((x as i32, y as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_driver(script: &str) -> BridgeDriver {
        BridgeDriver::new(BridgeConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs: 5,
            output_limit_bytes: 1_000_000,
        })
    }

    fn target() -> ResolvedTarget {
        ResolvedTarget {
            pid: 1234,
            process_name: "app.exe".to_string(),
            window_handle: None,
        }
    }

    #[test]
    fn list_controls_parses_and_caps_reply() {
        let driver = sh_driver(
            r#"cat > /dev/null; echo '{"ok": true, "controls": [{"automation_id": "a", "name": "A", "control_type": "Button", "enabled": true, "visible": true}]}'"#,
        );
        let controls = driver.list_controls(&target(), 3).expect("controls");
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].automation_id, "a");
    }

    #[test]
    fn bridge_error_reply_surfaces_message() {
        let driver =
            sh_driver(r#"cat > /dev/null; echo '{"ok": false, "error": "no such window"}'"#);
        let err = driver.focus_window(&target()).unwrap_err();
        assert!(err.to_string().contains("no such window"));
    }

    #[test]
    fn toggle_state_requires_boolean() {
        let driver = sh_driver(r#"cat > /dev/null; echo '{"ok": true}'"#);
        let element = ElementInfo::default();
        let err = driver.toggle_state(&target(), &element).unwrap_err();
        assert!(err.to_string().contains("missing state"));
    }
}
