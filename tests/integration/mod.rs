//! Integration tests for the wiresync cache, reconciler and orchestrator

mod orchestrator;
mod reconciler;
mod render_queue;
pub mod test_utils;
