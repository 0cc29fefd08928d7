//! Core contracts for the inkdash rotation engine: frame payloads, the
//! content-source and sink capabilities, and the shared-resource registry.
//! The scheduler that drives these lives in `inkdash-daemon`.

pub mod frame;
pub mod resource;
pub mod sink;
pub mod source;

pub use frame::{Frame, FrameData, Resolution};
pub use resource::{RegistryError, ResourceKind, ResourceProvider, ResourceRegistry, SharedResource};
pub use sink::Sink;
pub use source::{ContentSource, PollResult, SourceContext};
