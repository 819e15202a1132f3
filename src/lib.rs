//! wiresync: local artifact cache and remote reconciliation
//!
//! Keeps a device-local cache of generated wireframe artifacts consistent with an
//! authoritative remote store, and drives rate-limited generation calls through a
//! bounded retry policy.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod orchestrator;
pub mod remote;
pub mod render;
pub mod retry;
pub mod sync;
pub mod types;
