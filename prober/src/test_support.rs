//! Test-only fakes and fixtures: scripted drivers, fixed pointer samplers
//! and a temp workspace, so loop and oracle behavior is testable without a
//! desktop.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::{ElementInfo, ElementState, WindowInfo};
use crate::explore::ExploreEnv;
use crate::io::driver::{ScreenCapture, UiDriver};
use crate::io::guard::PointerSampler;
use crate::io::paths::ProberPaths;
use crate::io::session::Session;
use crate::io::target::ResolvedTarget;

/// Deterministic element with sensible defaults.
pub fn element(automation_id: &str, name: &str, control_type: &str) -> ElementInfo {
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

/// Driver returning scripted listings and recording every interaction.
#[derive(Default)]
pub struct ScriptedDriver {
    listing: Vec<ElementInfo>,
    windows: Vec<WindowInfo>,
    listing_error: Option<String>,
    toggle_states: RefCell<HashMap<String, bool>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedDriver {
    /// Fixed listing returned by every `list_controls` call.
    pub fn with_listing(mut self, listing: Vec<ElementInfo>) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_windows(mut self, windows: Vec<WindowInfo>) -> Self {
        self.windows = windows;
        self
    }

    /// Make every listing call fail with this message.
    pub fn with_listing_failure(mut self, message: &str) -> Self {
        self.listing_error = Some(message.to_string());
        self
    }

    /// Interactions seen so far, one short line each.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn note(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl UiDriver for ScriptedDriver {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.windows.clone())
    }

    fn list_controls(&self, _target: &ResolvedTarget, depth: u32) -> Result<Vec<ElementInfo>> {
        if let Some(message) = &self.listing_error {
            return Err(anyhow!("{message}"));
        }
        self.note(format!("list_controls depth={depth}"));
        Ok(self.listing.clone())
    }

    fn click(&self, _target: &ResolvedTarget, element: &ElementInfo) -> Result<()> {
        self.note(format!("click {}", element.automation_id));
        Ok(())
    }

    fn click_at(&self, _target: &ResolvedTarget, x: i32, y: i32) -> Result<()> {
        self.note(format!("click_at {x},{y}"));
        Ok(())
    }

    fn type_text(
        &self,
        _target: &ResolvedTarget,
        element: &ElementInfo,
        text: &str,
        clear: bool,
    ) -> Result<()> {
        self.note(format!(
            "type_text {} {text:?} clear={clear}",
            element.automation_id
        ));
        Ok(())
    }

    fn toggle(&self, _target: &ResolvedTarget, element: &ElementInfo) -> Result<()> {
        self.note(format!("toggle {}", element.automation_id));
        let mut states = self.toggle_states.borrow_mut();
        let state = states.entry(element.automation_id.clone()).or_insert(false);
        *state = !*state;
        Ok(())
    }

    fn toggle_state(&self, _target: &ResolvedTarget, element: &ElementInfo) -> Result<bool> {
        Ok(*self
            .toggle_states
            .borrow()
            .get(&element.automation_id)
            .unwrap_or(&false))
    }

    fn select_combo(
        &self,
        _target: &ResolvedTarget,
        element: &ElementInfo,
        item_text: &str,
    ) -> Result<()> {
        self.note(format!(
            "select_combo {} {item_text:?}",
            element.automation_id
        ));
        Ok(())
    }

    fn read_text(&self, _target: &ResolvedTarget, element: &ElementInfo) -> Result<String> {
        self.note(format!("read_text {}", element.automation_id));
        Ok(element.name.clone())
    }

    fn element_state(
        &self,
        _target: &ResolvedTarget,
        element: &ElementInfo,
    ) -> Result<ElementState> {
        Ok(ElementState {
            enabled: element.enabled,
            visible: element.visible,
            value: element.value.clone(),
            selected: None,
            rect: element.rect,
        })
    }

    fn focus_window(&self, _target: &ResolvedTarget) -> Result<String> {
        self.note("focus_window".to_string());
        Ok("Scripted Window".to_string())
    }

    fn close_window(&self, _target: &ResolvedTarget) -> Result<()> {
        self.note("close_window".to_string());
        Ok(())
    }
}

/// Capture fake writing an empty file at the requested path.
#[derive(Default)]
pub struct ScriptedCapture {
    fail: Cell<bool>,
}

impl ScriptedCapture {
    pub fn failing() -> Self {
        let capture = Self::default();
        capture.fail.set(true);
        capture
    }
}

impl ScreenCapture for ScriptedCapture {
    fn capture(&self, _target: &ResolvedTarget, save_path: &Path) -> Result<PathBuf> {
        if self.fail.get() {
            return Err(anyhow!("capture unavailable"));
        }
        if let Some(parent) = save_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(save_path, b"")?;
        Ok(save_path.to_path_buf())
    }
}

/// Pointer sampler replaying fixed positions; the last one repeats.
pub struct FixedSampler {
    positions: RefCell<VecDeque<(i32, i32)>>,
    last: Cell<(i32, i32)>,
}

impl FixedSampler {
    pub fn new(positions: Vec<(i32, i32)>) -> Self {
        Self {
            positions: RefCell::new(positions.into()),
            last: Cell::new((0, 0)),
        }
    }
}

impl PointerSampler for FixedSampler {
    fn cursor_pos(&self) -> Result<(i32, i32)> {
        if let Some(position) = self.positions.borrow_mut().pop_front() {
            self.last.set(position);
        }
        Ok(self.last.get())
    }
}

/// Temp working root with prober directories in place.
pub struct TestWorkspace {
    _temp: tempfile::TempDir,
    pub paths: ProberPaths,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProberPaths::new(temp.path());
        paths.ensure_dirs().expect("ensure dirs");
        Self { _temp: temp, paths }
    }

    /// Target backed by the test process itself, so liveness holds.
    pub fn live_target(&self) -> ResolvedTarget {
        ResolvedTarget {
            pid: std::process::id(),
            process_name: "prober-test".to_string(),
            window_handle: None,
        }
    }

    pub fn session(&self, session_id: &str) -> Session {
        Session::with_id(&self.paths, session_id)
    }

    pub fn env<'a>(
        &'a self,
        driver: &'a ScriptedDriver,
        target: &'a ResolvedTarget,
    ) -> ExploreEnv<'a> {
        ExploreEnv {
            driver,
            capture: None,
            sampler: None,
            paths: &self.paths,
            target,
        }
    }
}
