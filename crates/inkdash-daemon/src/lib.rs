//! The inkdash scheduling core: a single-task loop that rotates content
//! sources onto a sink, computes per-cycle waits from their intervals, and
//! honors out-of-band wake requests.

pub mod orchestrator;
mod wake;

pub use orchestrator::{Orchestrator, RotatorError};
pub use wake::RotatorHandle;
