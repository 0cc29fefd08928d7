//! Output sinks for the inkdash rotation. Only the save-to-disk sink lives
//! here; a physical e-paper driver would implement the same `Sink` contract
//! in its own crate.

pub mod disk;

pub use disk::DiskSink;
