use async_trait::async_trait;

use crate::frame::{Frame, Resolution};

/// Minimal capability for presenting rendered frames.
///
/// `start` and `stop` bracket the scheduler's run. Errors from `present`
/// are fatal to the rotation; a sink that cannot display has nothing useful
/// left to do.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Fixed target frame dimensions.
    fn resolution(&self) -> Resolution;

    async fn start(&mut self) -> anyhow::Result<()>;

    async fn stop(&mut self) -> anyhow::Result<()>;

    /// Display a frame.
    async fn present(&mut self, frame: &Frame) -> anyhow::Result<()>;
}
