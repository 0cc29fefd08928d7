use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::frame::{Frame, Resolution};
use crate::resource::ResourceRegistry;

/// Outcome of a single poll of a content source.
#[derive(Debug)]
pub enum PollResult {
    /// No usable state this check; the source does not claim the turn.
    Skip,
    /// State still valid; claim the turn but emit nothing new.
    Unchanged,
    /// New renderable content; claim the turn and emit it.
    Frame(Frame),
}

/// Shared context handed to a source exactly once, when it is first visited
/// by the scheduler.
#[derive(Clone)]
pub struct SourceContext {
    /// Target dimensions of the configured sink.
    pub resolution: Resolution,
    /// Accessor for lazily-started shared resources.
    pub resources: Arc<ResourceRegistry>,
}

/// A pluggable unit producing renderable frames on its own cadence.
///
/// Lifecycle: the scheduler calls `start` at most once (on first visit),
/// then `next` once per cycle until the source claims the turn or the cycle
/// ends, and `stop` at most once during shutdown, in reverse start order.
///
/// Errors returned from `start` or `next` are fatal to the whole rotation.
/// Sources that want to survive transient failures (network, missing files)
/// should handle them internally and return [`PollResult::Skip`].
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short identifier used in logs and error context.
    fn name(&self) -> &str;

    /// Maximum delay before this source should be re-checked.
    ///
    /// `None` means the source is purely event-driven and only needs
    /// checking when the rotation is externally woken.
    fn min_interval(&self) -> Option<Duration>;

    /// One-time initialization against the shared context.
    async fn start(&mut self, ctx: &SourceContext) -> anyhow::Result<()>;

    /// One-time teardown.
    async fn stop(&mut self) -> anyhow::Result<()>;

    /// Poll the source for content.
    ///
    /// `force = true` means this source did not win the previous cycle
    /// (another source was shown, or nothing was): ignore any de-duplication
    /// cache and re-emit even if nothing changed. `force = false` means the
    /// source won the previous cycle and should only emit on a real change.
    async fn next(&mut self, force: bool) -> anyhow::Result<PollResult>;
}
