//! Daemon assembly: build the registry, sink and sources from config, run
//! the rotation, and wire signals and the status-file watcher to the
//! orchestrator handle.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use inkdash_core::{Resolution, ResourceRegistry};
use inkdash_daemon::{Orchestrator, RotatorHandle};
use inkdash_display::DiskSink;
use inkdash_render::{HTML_RENDERER, HtmlRendererProvider};
use inkdash_sources::{NowPlayingSource, SlideshowSource, StatusFileClient, WeatherSource};

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let resolution = Resolution::new(config.display.width, config.display.height);

    let mut registry = ResourceRegistry::new();
    registry.register(
        HTML_RENDERER,
        Box::new(HtmlRendererProvider::new(config.renderer.browser.as_deref())),
    );

    let mut orch = Orchestrator::new(registry);
    orch.set_sink(Box::new(
        DiskSink::new(&config.display.output).with_resolution(resolution),
    ));

    // Rotation priority is the order sources are added: now-playing beats
    // the weather widget, which beats the slideshow filler.
    let mut enabled = 0;
    if let Some(np) = &config.sources.nowplaying {
        orch.add_source(Box::new(NowPlayingSource::new(
            Box::new(StatusFileClient::new(&np.status_file)),
            np.poll_interval(),
        )));
        enabled += 1;
    }
    if let Some(weather) = &config.sources.weather {
        orch.add_source(Box::new(WeatherSource::new(
            weather.location.as_deref(),
            Duration::from_secs(weather.interval_secs),
        )));
        enabled += 1;
    }
    if let Some(slideshow) = &config.sources.slideshow {
        let source =
            SlideshowSource::new(&slideshow.path, Duration::from_secs(slideshow.interval_secs))
                .with_context(|| {
                    format!("scanning slideshow directory {}", slideshow.path.display())
                })?;
        orch.add_source(Box::new(source));
        enabled += 1;
    }
    anyhow::ensure!(
        enabled > 0,
        "no sources configured; add at least one [sources.*] table"
    );

    let handle = orch.handle();
    info!(
        sources = enabled,
        output = %config.display.output.display(),
        %resolution,
        "rotation configured"
    );

    // Must stay alive for the watch to stay active.
    let _watcher = config
        .sources
        .nowplaying
        .as_ref()
        .filter(|np| np.watch)
        .map(|np| watch_status_file(&np.status_file, handle.clone()))
        .transpose()?;

    wire_wake_signals(&handle)?;

    let mut rotation = tokio::spawn(async move { orch.run().await });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {
            handle.shutdown();
            rotation.await.context("rotation task panicked")??;
        }
        res = &mut rotation => {
            res.context("rotation task panicked")??;
            warn!("rotation loop exited on its own");
        }
    }

    Ok(())
}

/// SIGUSR1 wakes the rotation; SIGUSR2 additionally forces a full refresh.
#[cfg(unix)]
fn wire_wake_signals(handle: &RotatorHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = signal(SignalKind::user_defined1()).context("registering SIGUSR1 handler")?;
    let h = handle.clone();
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            info!("SIGUSR1: waking rotation");
            h.wakeup(false);
        }
    });

    let mut usr2 = signal(SignalKind::user_defined2()).context("registering SIGUSR2 handler")?;
    let h = handle.clone();
    tokio::spawn(async move {
        while usr2.recv().await.is_some() {
            info!("SIGUSR2: forcing full refresh");
            h.wakeup(true);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn wire_wake_signals(_handle: &RotatorHandle) -> anyhow::Result<()> {
    Ok(())
}

/// Watch the player status file and wake the rotation when it changes.
///
/// Watches the parent directory rather than the file itself: player daemons
/// typically replace the file by rename, which would drop a direct watch.
fn watch_status_file(path: &Path, handle: RotatorHandle) -> anyhow::Result<RecommendedWatcher> {
    let target = path.file_name().map(std::ffi::OsString::from);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            if event
                .paths
                .iter()
                .any(|p| p.file_name().map(std::ffi::OsString::from) == target)
            {
                // wakeup is synchronous and lock-light, safe from the
                // watcher's own thread.
                handle.wakeup(false);
            }
        }
        Err(e) => warn!("status file watcher error: {e}"),
    })?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        warn!(path = %dir.display(), "failed to watch status directory: {e}");
    } else {
        info!(path = %path.display(), "watching status file");
    }
    Ok(watcher)
}
