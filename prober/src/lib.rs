//! Automated exploration and fault isolation for live desktop applications.
//!
//! This crate drives a target application through its platform accessibility
//! tree: it resolves a running process into a stable handle, locates elements
//! via a fallback selector strategy, detects failures through composable
//! health oracles, explores via interchangeable decision policies (scripted
//! replay, seeded random, externally guided), and reduces a failing action
//! sequence to a minimal reproducer. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selector matching, safety
//!   classification, sequence minimization). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting operations (process table, collaborator
//!   bridge, durable guard state, session artifacts). Isolated to enable
//!   scripted fakes in tests.
//!
//! Orchestration modules ([`actions`], [`explore`], [`oracles`], [`replay`],
//! [`policy`]) coordinate core logic with I/O to implement CLI commands.

pub mod actions;
pub mod core;
pub mod exit_codes;
pub mod explore;
pub mod io;
pub mod logging;
pub mod oracles;
pub mod policy;
pub mod replay;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
