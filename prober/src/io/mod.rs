//! Side-effecting operations: process table, collaborator bridge, durable
//! guard state, session artifacts. Isolated to enable scripted fakes in
//! tests.

pub mod bridge;
pub mod config;
pub mod decider;
pub mod driver;
pub mod guard;
pub mod launched;
pub mod paths;
pub mod session;
pub mod snapshot;
pub mod target;
