//! Directory slideshow: rotates through the PNG files of a directory at a
//! configured interval, yielding the turn between slides so lower-priority
//! sources never starve and higher-priority ones keep pre-empting.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, warn};

use inkdash_core::{ContentSource, Frame, PollResult, Resolution, SourceContext};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

pub struct SlideshowSource {
    interval: Duration,
    /// Rotation queue; the front slide is shown next, then requeued.
    files: VecDeque<PathBuf>,
    last_update: Option<Instant>,
    resolution: Resolution,
}

impl SlideshowSource {
    /// Scan `path` for PNG files and build a rotation in shuffled order.
    /// The set is fixed at construction; files added later are not picked
    /// up until restart.
    pub fn new(path: &Path, interval: Duration) -> anyhow::Result<Self> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let candidate = entry.path();
            if !candidate.is_file() {
                continue;
            }
            let is_png = candidate
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png"));
            if is_png {
                files.push(candidate);
            }
        }
        files.sort();
        shuffle(&mut files, time_seed());
        debug!(count = files.len(), path = %path.display(), "slideshow scanned");

        Ok(Self {
            interval,
            files: files.into(),
            last_update: None,
            resolution: Resolution::new(0, 0),
        })
    }

    fn due(&self) -> bool {
        self.min_interval() == Some(Duration::ZERO)
    }
}

#[async_trait]
impl ContentSource for SlideshowSource {
    fn name(&self) -> &str {
        "slideshow"
    }

    /// With fewer than two slides there is nothing to rotate, so the
    /// slideshow never asks for a proactive re-check. Otherwise the wait is
    /// whatever remains of the interval since the last slide.
    fn min_interval(&self) -> Option<Duration> {
        if self.files.len() < 2 {
            return None;
        }
        match self.last_update {
            None => Some(self.interval),
            Some(at) => Some(self.interval.saturating_sub(at.elapsed())),
        }
    }

    async fn start(&mut self, ctx: &SourceContext) -> anyhow::Result<()> {
        self.resolution = ctx.resolution;
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next(&mut self, force: bool) -> anyhow::Result<PollResult> {
        if self.files.is_empty() {
            return Ok(PollResult::Skip);
        }

        if !(force || self.due()) {
            return Ok(PollResult::Unchanged);
        }

        // Front of the queue is the next slide; requeue it at the back.
        let slide = match self.files.pop_front() {
            Some(slide) => slide,
            None => return Ok(PollResult::Skip),
        };
        self.files.push_back(slide.clone());
        self.last_update = Some(Instant::now());

        match tokio::fs::read(&slide).await {
            Ok(bytes) => {
                debug!(slide = %slide.display(), "showing slide");
                Ok(PollResult::Frame(Frame::png(self.resolution, bytes.into())))
            }
            Err(e) => {
                // A slide vanishing from under us is not worth halting the
                // whole rotation; yield the turn instead.
                warn!(slide = %slide.display(), error = %e, "failed to read slide");
                Ok(PollResult::Skip)
            }
        }
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Seeded Fisher-Yates; splitmix64 for the index stream. No RNG crate is
/// worth pulling in for one shuffle at startup.
fn shuffle<T>(items: &mut [T], mut seed: u64) {
    let mut next = move || {
        seed = seed.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    };
    for i in (1..items.len()).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
