//! Target application resolution and the process-wide target registry.
//!
//! A [`TargetSpec`] describes how to find (or launch) the application under
//! test; resolution turns it into a [`ResolvedTarget`] and registers it under
//! a fresh `target-N` id. Registry entries are never mutated, only added, and
//! an id once issued never refers to a different target. Repeated resolution
//! of an equivalent spec yields a new entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::RegexBuilder;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::core::errors::ProbeError;
use crate::io::driver::UiDriver;
use crate::io::launched::record_launched;
use crate::io::paths::ProberPaths;
use crate::io::session::now_ms;

/// How long a launched process gets to settle before we check it survived.
const DEFAULT_LAUNCH_SETTLE: Duration = Duration::from_secs(2);

/// How to resolve a target application. Immutable input to resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// An already-running process by pid.
    Pid(u32),
    /// Case-insensitive exact match over live process names. First match
    /// wins; among duplicates the pick is non-deterministic (accepted
    /// ambiguity).
    ProcessName(String),
    /// Launch a new process and attach to it.
    ExecutablePath {
        exe: PathBuf,
        args: Vec<String>,
        cwd: Option<PathBuf>,
    },
    /// First top-level window whose title matches the pattern
    /// (case-insensitive, unanchored).
    TitlePattern(String),
}

/// A resolved reference to a running application.
///
/// Holds no live connection; `is_alive` is computed fresh on every call
/// because the process can exit at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub pid: u32,
    pub process_name: String,
    pub window_handle: Option<u64>,
}

impl ResolvedTarget {
    pub fn is_alive(&self) -> bool {
        pid_exists(self.pid)
    }
}

/// True if a process with `pid` currently exists.
pub fn pid_exists(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system.process(Pid::from_u32(pid)).is_some()
}

fn process_name(pid: u32) -> Option<String> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system
        .process(Pid::from_u32(pid))
        .map(|process| process.name().to_string_lossy().to_string())
}

struct RegistryInner {
    counter: u64,
    targets: HashMap<String, Arc<ResolvedTarget>>,
}

/// Table of resolved targets, one per process lifetime.
///
/// An explicit instance owned by the top-level run and passed by reference
/// into resolvers and consumers; id assignment and insertion happen under one
/// lock so concurrent entry points never collide on ids.
pub struct TargetRegistry {
    inner: Mutex<RegistryInner>,
    launch_settle: Duration,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                counter: 0,
                targets: HashMap::new(),
            }),
            launch_settle: DEFAULT_LAUNCH_SETTLE,
        }
    }

    /// Override the launch settle delay (tests).
    pub fn with_launch_settle(mut self, settle: Duration) -> Self {
        self.launch_settle = settle;
        self
    }

    /// Resolve a spec into a live target and register it under a fresh id.
    pub fn resolve(
        &self,
        spec: &TargetSpec,
        driver: &dyn UiDriver,
        paths: &ProberPaths,
    ) -> Result<(String, Arc<ResolvedTarget>)> {
        let target = match spec {
            TargetSpec::Pid(pid) => resolve_by_pid(*pid)?,
            TargetSpec::ProcessName(name) => resolve_by_process_name(name)?,
            TargetSpec::ExecutablePath { exe, args, cwd } => {
                resolve_by_launch(exe, args, cwd.as_deref(), paths, self.launch_settle)?
            }
            TargetSpec::TitlePattern(pattern) => resolve_by_title(pattern, driver)?,
        };
        let (target_id, target) = self.register(target);
        info!(target_id, pid = target.pid, name = %target.process_name, "resolved target");
        Ok((target_id, target))
    }

    /// Look up a previously issued id.
    pub fn get(&self, target_id: &str) -> Result<Arc<ResolvedTarget>> {
        let inner = self.inner.lock().expect("target registry lock poisoned");
        inner
            .targets
            .get(target_id)
            .cloned()
            .ok_or_else(|| ProbeError::TargetNotFound(format!("unknown target id: {target_id}")).into())
    }

    fn register(&self, target: ResolvedTarget) -> (String, Arc<ResolvedTarget>) {
        let mut inner = self.inner.lock().expect("target registry lock poisoned");
        inner.counter += 1;
        let target_id = format!("target-{}", inner.counter);
        let target = Arc::new(target);
        inner.targets.insert(target_id.clone(), Arc::clone(&target));
        (target_id, target)
    }
}

fn resolve_by_pid(pid: u32) -> Result<ResolvedTarget> {
    let Some(name) = process_name(pid) else {
        return Err(ProbeError::TargetNotFound(format!("pid {pid} not found")).into());
    };
    Ok(ResolvedTarget {
        pid,
        process_name: name,
        window_handle: None,
    })
}

fn resolve_by_process_name(name: &str) -> Result<ResolvedTarget> {
    let wanted = name.to_lowercase();
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    for (pid, process) in system.processes() {
        let process_name = process.name().to_string_lossy().to_string();
        if process_name.to_lowercase() == wanted {
            return Ok(ResolvedTarget {
                pid: pid.as_u32(),
                process_name,
                window_handle: None,
            });
        }
    }
    Err(ProbeError::TargetNotFound(format!("process '{name}' not found")).into())
}

fn resolve_by_launch(
    exe: &Path,
    args: &[String],
    cwd: Option<&Path>,
    paths: &ProberPaths,
    settle: Duration,
) -> Result<ResolvedTarget> {
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    debug!(exe = %exe.display(), "launching target");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("launch {}", exe.display()))?;

    thread::sleep(settle);
    if let Some(status) = child.try_wait().context("poll launched process")? {
        return Err(ProbeError::TargetNotFound(format!(
            "process exited immediately ({:?}): {}",
            status.code(),
            exe.display()
        ))
        .into());
    }

    let pid = child.id();
    // Gate destructive close operations to processes we started ourselves.
    record_launched(&paths.launched_path, pid, &exe.display().to_string(), now_ms())?;

    let basename = exe
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| exe.display().to_string());
    Ok(ResolvedTarget {
        pid,
        process_name: basename,
        window_handle: None,
    })
}

fn resolve_by_title(pattern: &str, driver: &dyn UiDriver) -> Result<ResolvedTarget> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("compile title pattern {pattern:?}"))?;

    for window in driver.list_windows()? {
        if !regex.is_match(&window.title) {
            continue;
        }
        // The owning process can be gone by the time we look it up; skip
        // windows whose process no longer exists.
        let Some(name) = process_name(window.pid) else {
            continue;
        };
        return Ok(ResolvedTarget {
            pid: window.pid,
            process_name: name,
            window_handle: window.handle,
        });
    }
    Err(ProbeError::TargetNotFound(format!("no window matching '{pattern}'")).into())
}
