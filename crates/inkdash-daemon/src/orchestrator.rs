//! The rotation scheduler: visits content sources in fixed priority order,
//! shows the first claimed frame, and sleeps for the minimum interval any
//! source asked for — unless a wake request says otherwise.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use inkdash_core::{ContentSource, PollResult, ResourceRegistry, Sink, SourceContext};

use crate::wake::{RotatorHandle, WakeState};

#[derive(Debug, Error)]
pub enum RotatorError {
    #[error("no sink configured")]
    NoSink,
    #[error("source `{name}` failed")]
    Source {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("sink failure")]
    Sink(#[source] anyhow::Error),
}

/// The scheduling state machine.
///
/// A single task executes the cycle loop; sources are never polled in
/// parallel. [`RotatorHandle::wakeup`] may be called from any other task or
/// thread and only ever affects the sleep step, never an in-flight poll.
pub struct Orchestrator {
    sources: Vec<Box<dyn ContentSource>>,
    sink: Option<Box<dyn Sink>>,
    registry: Arc<ResourceRegistry>,
    /// Indices of sources that have been started, in start order.
    started: Vec<usize>,
    /// Source that claimed the turn in the most recently completed cycle.
    last_shown: Option<usize>,
    wake: Arc<WakeState>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(registry: ResourceRegistry) -> Self {
        Self::with_cancel(registry, CancellationToken::new())
    }

    /// Create an orchestrator with an explicit cancellation token for
    /// graceful shutdown.
    pub fn with_cancel(registry: ResourceRegistry, cancel: CancellationToken) -> Self {
        Self {
            sources: Vec::new(),
            sink: None,
            registry: Arc::new(registry),
            started: Vec::new(),
            last_shown: None,
            wake: Arc::new(WakeState::default()),
            cancel,
        }
    }

    /// Append a source to the rotation. Earlier sources have display
    /// priority within a cycle; the order is fixed for the process lifetime.
    pub fn add_source(&mut self, source: Box<dyn ContentSource>) {
        self.sources.push(source);
    }

    pub fn set_sink(&mut self, sink: Box<dyn Sink>) {
        self.sink = Some(sink);
    }

    /// Control surface for wake requests and shutdown; cloneable, safe to
    /// hand to signal handlers and watcher threads.
    pub fn handle(&self) -> RotatorHandle {
        RotatorHandle {
            wake: Arc::clone(&self.wake),
            cancel: self.cancel.clone(),
        }
    }

    /// Source that claimed the turn in the latest completed cycle, as an
    /// index into the rotation. `None` when every source skipped.
    pub fn last_shown(&self) -> Option<usize> {
        self.last_shown
    }

    /// Start the sink, then run cycles until shutdown or a fatal error.
    /// Teardown (sources in reverse start order, then sink, then registry)
    /// runs on every exit path. Consumes the configured sink; `run` is a
    /// one-shot call.
    pub async fn run(&mut self) -> Result<(), RotatorError> {
        let mut sink = self.sink.take().ok_or(RotatorError::NoSink)?;
        info!(sources = self.sources.len(), resolution = %sink.resolution(), "rotation starting");
        sink.start().await.map_err(RotatorError::Sink)?;

        let result = self.render_loop(&mut sink).await;

        self.teardown(&mut sink).await;
        result
    }

    async fn render_loop(&mut self, sink: &mut Box<dyn Sink>) -> Result<(), RotatorError> {
        self.last_shown = None;

        loop {
            if self.cancel.is_cancelled() {
                info!("shutdown requested, leaving rotation loop");
                return Ok(());
            }
            if self.wake.take_force_reset() {
                debug!("forced wake: treating every source as changed");
                self.last_shown = None;
            }

            // None = no source asked for a proactive re-check this cycle.
            let mut pause_time: Option<Duration> = None;
            let mut winner: Option<usize> = None;

            for idx in 0..self.sources.len() {
                if !self.started.contains(&idx) {
                    let name = self.sources[idx].name().to_string();
                    debug!(source = %name, "starting source on first visit");
                    let ctx = SourceContext {
                        resolution: sink.resolution(),
                        resources: Arc::clone(&self.registry),
                    };
                    self.sources[idx]
                        .start(&ctx)
                        .await
                        .map_err(|source| RotatorError::Source { name, source })?;
                    self.started.push(idx);
                }

                let force = self.last_shown != Some(idx);
                let result = {
                    let source = &mut self.sources[idx];
                    source.next(force).await.map_err(|e| RotatorError::Source {
                        name: source.name().to_string(),
                        source: e,
                    })?
                };

                if let Some(interval) = self.sources[idx].min_interval() {
                    pause_time = Some(match pause_time {
                        Some(current) => current.min(interval),
                        None => interval,
                    });
                }

                match result {
                    PollResult::Skip => continue,
                    PollResult::Unchanged => {
                        winner = Some(idx);
                        break;
                    }
                    PollResult::Frame(frame) => {
                        info!(source = self.sources[idx].name(), "presenting frame");
                        sink.present(&frame).await.map_err(RotatorError::Sink)?;
                        winner = Some(idx);
                        break;
                    }
                }
            }

            self.last_shown = winner;
            self.pause(pause_time).await;
        }
    }

    /// Step-4 suspension: consume a pending sleep bypass, or wait for
    /// `pause_time` (unbounded when `None`) until elapsed or cancelled.
    async fn pause(&self, pause_time: Option<Duration>) {
        if self.wake.take_skip() {
            debug!("sleep bypassed by pending wake request");
            return;
        }

        let token = CancellationToken::new();
        self.wake.arm(token.clone());
        // A wakeup that raced sleep registration left the skip flag set;
        // consume it here so the wait ends immediately instead of being
        // deferred to the next cycle.
        if self.wake.take_skip() {
            token.cancel();
        }

        match pause_time {
            Some(duration) => {
                debug!(?duration, "sleeping until next cycle");
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = token.cancelled() => debug!("sleep interrupted by wake request"),
                    _ = self.cancel.cancelled() => {}
                }
            }
            None => {
                debug!("no proactive interval, waiting for a wake request");
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        self.wake.disarm();
    }

    /// Best-effort teardown: every started source in reverse start order,
    /// then the sink, then the resource registry. Individual failures are
    /// logged and do not abort the remaining steps.
    async fn teardown(&mut self, sink: &mut Box<dyn Sink>) {
        let started = std::mem::take(&mut self.started);
        for idx in started.into_iter().rev() {
            let source = &mut self.sources[idx];
            debug!(source = source.name(), "stopping source");
            if let Err(e) = source.stop().await {
                warn!(source = source.name(), error = %format!("{e:#}"), "source teardown failed");
            }
        }

        if let Err(e) = sink.stop().await {
            warn!(error = %format!("{e:#}"), "sink teardown failed");
        }

        self.registry.shutdown().await;
        info!("rotation stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use inkdash_core::{
        Frame, Resolution, ResourceKind, ResourceProvider, SharedResource,
    };

    fn test_frame() -> Frame {
        Frame::png(Resolution::new(8, 8), Bytes::from_static(b"png"))
    }

    #[derive(Clone)]
    enum Step {
        Skip,
        Unchanged,
        Emit,
        Fail,
    }

    type PollEvent = (&'static str, bool);

    /// Scripted source: answers `next()` from a fixed step list (the last
    /// step repeats forever) and reports every poll on a channel.
    struct ScriptSource {
        name: &'static str,
        interval: Option<Duration>,
        script: VecDeque<Step>,
        repeat: Step,
        events: mpsc::UnboundedSender<PollEvent>,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
        stop_log: Option<Arc<StdMutex<Vec<&'static str>>>>,
        fail_stop: bool,
        on_poll: Option<Arc<dyn Fn() + Send + Sync>>,
    }

    impl ScriptSource {
        fn new(
            name: &'static str,
            interval: Option<Duration>,
            script: &[Step],
            events: mpsc::UnboundedSender<PollEvent>,
        ) -> Self {
            let repeat = script.last().cloned().unwrap_or(Step::Skip);
            Self {
                name,
                interval,
                script: script.to_vec().into(),
                repeat,
                events,
                started: Arc::new(AtomicBool::new(false)),
                stopped: Arc::new(AtomicBool::new(false)),
                stop_log: None,
                fail_stop: false,
                on_poll: None,
            }
        }
    }

    #[async_trait]
    impl ContentSource for ScriptSource {
        fn name(&self) -> &str {
            self.name
        }

        fn min_interval(&self) -> Option<Duration> {
            self.interval
        }

        async fn start(&mut self, _ctx: &SourceContext) -> anyhow::Result<()> {
            let already = self.started.swap(true, Ordering::SeqCst);
            assert!(!already, "source `{}` started twice", self.name);
            Ok(())
        }

        async fn stop(&mut self) -> anyhow::Result<()> {
            let already = self.stopped.swap(true, Ordering::SeqCst);
            assert!(!already, "source `{}` stopped twice", self.name);
            if let Some(log) = &self.stop_log {
                log.lock().unwrap().push(self.name);
            }
            if self.fail_stop {
                anyhow::bail!("stop exploded");
            }
            Ok(())
        }

        async fn next(&mut self, force: bool) -> anyhow::Result<PollResult> {
            let _ = self.events.send((self.name, force));
            if let Some(hook) = &self.on_poll {
                hook();
            }
            let step = self.script.pop_front().unwrap_or_else(|| self.repeat.clone());
            match step {
                Step::Skip => Ok(PollResult::Skip),
                Step::Unchanged => Ok(PollResult::Unchanged),
                Step::Emit => Ok(PollResult::Frame(test_frame())),
                Step::Fail => anyhow::bail!("poll failed"),
            }
        }
    }

    struct NullSink {
        presented: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
        fail_present: bool,
    }

    impl NullSink {
        fn new() -> Self {
            Self {
                presented: Arc::new(AtomicUsize::new(0)),
                stopped: Arc::new(AtomicBool::new(false)),
                fail_present: false,
            }
        }
    }

    #[async_trait]
    impl Sink for NullSink {
        fn resolution(&self) -> Resolution {
            Resolution::new(8, 8)
        }

        async fn start(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&mut self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn present(&mut self, _frame: &Frame) -> anyhow::Result<()> {
            if self.fail_present {
                anyhow::bail!("display refused the frame");
            }
            self.presented.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<PollEvent>) -> PollEvent {
        timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for a poll")
            .expect("event channel closed")
    }

    async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<PollEvent>) {
        let got = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_err(), "unexpected poll: {:?}", got);
    }

    #[tokio::test]
    async fn run_without_sink_fails_fast() {
        let mut orch = Orchestrator::new(ResourceRegistry::new());
        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, RotatorError::NoSink));
    }

    #[tokio::test]
    async fn first_non_skip_wins_and_later_sources_never_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        let skipper = ScriptSource::new("skipper", None, &[Step::Skip], tx.clone());
        let winner = ScriptSource::new("winner", None, &[Step::Emit], tx.clone());
        let shadowed = ScriptSource::new("shadowed", None, &[Step::Emit], tx);
        let shadowed_started = Arc::clone(&shadowed.started);

        let sink = NullSink::new();
        let presented = Arc::clone(&sink.presented);

        orch.add_source(Box::new(skipper));
        orch.add_source(Box::new(winner));
        orch.add_source(Box::new(shadowed));
        orch.set_sink(Box::new(sink));

        let handle = orch.handle();
        let run = tokio::spawn(async move {
            let result = orch.run().await;
            (orch, result)
        });

        assert_eq!(next_event(&mut rx).await, ("skipper", true));
        assert_eq!(next_event(&mut rx).await, ("winner", true));
        assert_no_event(&mut rx).await;

        handle.shutdown();
        let (orch, result) = run.await.unwrap();
        result.unwrap();

        assert_eq!(presented.load(Ordering::SeqCst), 1);
        assert!(!shadowed_started.load(Ordering::SeqCst), "source after the winner must stay unstarted");
        assert_eq!(orch.last_shown(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_minimum_finite_interval_and_winner_keeps_turn() {
        // Scenario: intervals 5s / 10s / unbounded; the first source always
        // skips, the second always emits, the third is never reached.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        let fast = ScriptSource::new("fast", Some(Duration::from_secs(5)), &[Step::Skip], tx.clone());
        let player = ScriptSource::new("player", Some(Duration::from_secs(10)), &[Step::Emit], tx.clone());
        let push = ScriptSource::new("push", None, &[Step::Emit], tx);
        let push_started = Arc::clone(&push.started);

        orch.add_source(Box::new(fast));
        orch.add_source(Box::new(player));
        orch.add_source(Box::new(push));
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        tokio::spawn(async move {
            let _ = orch.run().await;
        });

        let cycle1_at = tokio::time::Instant::now();
        assert_eq!(next_event(&mut rx).await, ("fast", true));
        assert_eq!(next_event(&mut rx).await, ("player", true));

        // Second cycle: the winner is re-polled with force = false, and the
        // wait was the minimum finite interval (5s), not the winner's 10s.
        assert_eq!(next_event(&mut rx).await, ("fast", true));
        let elapsed = cycle1_at.elapsed();
        assert_eq!(elapsed, Duration::from_secs(5), "pause must follow the fastest source");
        assert_eq!(next_event(&mut rx).await, ("player", false));

        // A forced wake resets the rotation: everyone is treated as changed.
        handle.wakeup(true);
        assert_eq!(next_event(&mut rx).await, ("fast", true));
        assert_eq!(next_event(&mut rx).await, ("player", true));

        assert!(!push_started.load(Ordering::SeqCst), "push source is never polled proactively");
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn all_skip_cycle_clears_last_shown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        // Emits once, then has nothing; the second source always skips.
        let flaky = ScriptSource::new("flaky", None, &[Step::Emit, Step::Skip], tx.clone());
        let quiet = ScriptSource::new("quiet", None, &[Step::Skip], tx);

        orch.add_source(Box::new(flaky));
        orch.add_source(Box::new(quiet));
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        let run = tokio::spawn(async move {
            let result = orch.run().await;
            (orch, result)
        });

        assert_eq!(next_event(&mut rx).await, ("flaky", true));

        handle.wakeup(false);
        // Previous winner polled without force, skips; the rest is forced.
        assert_eq!(next_event(&mut rx).await, ("flaky", false));
        assert_eq!(next_event(&mut rx).await, ("quiet", true));

        handle.wakeup(false);
        // The all-skip cycle cleared the winner, so everyone is forced now.
        assert_eq!(next_event(&mut rx).await, ("flaky", true));
        assert_eq!(next_event(&mut rx).await, ("quiet", true));

        handle.shutdown();
        let (orch, result) = run.await.unwrap();
        result.unwrap();
        assert_eq!(orch.last_shown(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pure_push_source_sleeps_unbounded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());
        orch.add_source(Box::new(ScriptSource::new("push", None, &[Step::Unchanged], tx)));
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        tokio::spawn(async move {
            let _ = orch.run().await;
        });

        assert_eq!(next_event(&mut rx).await, ("push", true));
        // No finite interval and no wake request: the rotation stays parked.
        assert_no_event(&mut rx).await;
        handle.shutdown();
    }

    #[tokio::test]
    async fn wakeup_while_sleeping_ends_the_sleep_early() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());
        orch.add_source(Box::new(ScriptSource::new(
            "slow",
            Some(Duration::from_secs(3600)),
            &[Step::Unchanged],
            tx,
        )));
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        tokio::spawn(async move {
            let _ = orch.run().await;
        });

        assert_eq!(next_event(&mut rx).await, ("slow", true));
        // Let the scheduler reach the sleep before waking it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.wakeup(false);

        // Far sooner than the 3600s the source asked for.
        assert_eq!(next_event(&mut rx).await, ("slow", false));
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn wakeup_while_polling_skips_exactly_one_sleep() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());
        let handle = orch.handle();

        // Two rapid wakeups land during the first poll, while no sleep is
        // pending.
        let mut source = ScriptSource::new("busy", None, &[Step::Unchanged], tx);
        let fired = Arc::new(AtomicBool::new(false));
        let wake = handle.clone();
        source.on_poll = Some(Arc::new(move || {
            if !fired.swap(true, Ordering::SeqCst) {
                wake.wakeup(false);
                wake.wakeup(false);
            }
        }));

        orch.add_source(Box::new(source));
        orch.set_sink(Box::new(NullSink::new()));

        tokio::spawn(async move {
            let _ = orch.run().await;
        });

        assert_eq!(next_event(&mut rx).await, ("busy", true));
        // The doubled wake skips exactly the next sleep...
        assert_eq!(next_event(&mut rx).await, ("busy", false));
        // ...and only that one.
        assert_no_event(&mut rx).await;
        handle.shutdown();
    }

    #[tokio::test]
    async fn source_error_is_fatal_but_teardown_still_runs() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        let broken = ScriptSource::new("broken", None, &[Step::Fail], tx.clone());
        let broken_stopped = Arc::clone(&broken.stopped);
        let never = ScriptSource::new("never", None, &[Step::Emit], tx);
        let never_started = Arc::clone(&never.started);

        let sink = NullSink::new();
        let sink_stopped = Arc::clone(&sink.stopped);

        orch.add_source(Box::new(broken));
        orch.add_source(Box::new(never));
        orch.set_sink(Box::new(sink));

        let err = orch.run().await.unwrap_err();
        match err {
            RotatorError::Source { name, .. } => assert_eq!(name, "broken"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(broken_stopped.load(Ordering::SeqCst), "started source must be torn down");
        assert!(!never_started.load(Ordering::SeqCst));
        assert!(sink_stopped.load(Ordering::SeqCst), "sink must be torn down");
    }

    #[tokio::test]
    async fn sink_error_is_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        let source = ScriptSource::new("emitter", None, &[Step::Emit], tx);
        let stopped = Arc::clone(&source.stopped);
        orch.add_source(Box::new(source));

        let mut sink = NullSink::new();
        sink.fail_present = true;
        orch.set_sink(Box::new(sink));

        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, RotatorError::Sink(_)));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_reverse_start_order_and_best_effort() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop_log: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));
        let mut orch = Orchestrator::new(ResourceRegistry::new());

        for name in ["a", "b", "c"] {
            let mut source = ScriptSource::new(name, None, &[Step::Skip], tx.clone());
            source.stop_log = Some(Arc::clone(&stop_log));
            // The middle teardown fails; the others must still run.
            source.fail_stop = name == "b";
            orch.add_source(Box::new(source));
        }
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        let run = tokio::spawn(async move { orch.run().await });

        // One all-skip cycle starts every source.
        for name in ["a", "b", "c"] {
            assert_eq!(next_event(&mut rx).await, (name, true));
        }

        handle.shutdown();
        run.await.unwrap().unwrap();

        assert_eq!(*stop_log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    /// Provider + source pair exercising the registry through the source
    /// context, the way real sources acquire shared resources.
    struct UnitProvider {
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResourceProvider for UnitProvider {
        async fn start(&self) -> anyhow::Result<SharedResource> {
            Ok(Arc::new(42u32))
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ResourceUser {
        acquired: Arc<AtomicBool>,
    }

    const UNIT: ResourceKind = ResourceKind::new("unit");

    #[async_trait]
    impl ContentSource for ResourceUser {
        fn name(&self) -> &str {
            "resource-user"
        }

        fn min_interval(&self) -> Option<Duration> {
            None
        }

        async fn start(&mut self, ctx: &SourceContext) -> anyhow::Result<()> {
            let value = ctx.resources.get_as::<u32>(UNIT).await?;
            self.acquired.store(*value == 42, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn next(&mut self, _force: bool) -> anyhow::Result<PollResult> {
            Ok(PollResult::Unchanged)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn registry_is_wired_through_the_context_and_shut_down() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut registry = ResourceRegistry::new();
        registry.register(
            UNIT,
            Box::new(UnitProvider {
                stops: Arc::clone(&stops),
            }),
        );

        let acquired = Arc::new(AtomicBool::new(false));
        let mut orch = Orchestrator::new(registry);
        orch.add_source(Box::new(ResourceUser {
            acquired: Arc::clone(&acquired),
        }));
        orch.set_sink(Box::new(NullSink::new()));

        let handle = orch.handle();
        let run = tokio::spawn(async move { orch.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();
        run.await.unwrap().unwrap();

        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(stops.load(Ordering::SeqCst), 1, "requested provider is stopped once");
    }
}
