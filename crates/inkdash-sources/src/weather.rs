//! Weather widget: renders a third-party HTML weather widget through the
//! shared renderer on a clock-aligned interval (an hourly widget refreshes
//! on the hour, not an hour after whenever the process started).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use inkdash_core::{ContentSource, PollResult, Resolution, SourceContext};
use inkdash_render::{HTML_RENDERER, HtmlRenderer};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

const TEMPLATE_AUTO: &str = r##"<html><body style="margin:0"><div id="ww_015d9fd14a2fa" v='1.3' loc='auto' a='{"t":"horizontal","lang":"en","sl_lpl":1,"ids":[],"font":"Arial","sl_ics":"one","sl_sot":"celsius","cl_bkg":"image","cl_font":"#FFFFFF","cl_cloud":"#FFFFFF","cl_persp":"#81D4FA","cl_sun":"#FFC107","cl_moon":"#FFC107","cl_thund":"#FF5722"}'></div><script async src="https://app2.weatherwidget.org/js/?id=ww_015d9fd14a2fa"></script></body></html>"##;
const TEMPLATE_LOC: &str = r##"<html><body style="margin:0"><div id="ww_17a90a88b8155" v='1.3' loc='id' a='{"t":"horizontal","lang":"en","sl_lpl":1,"ids":["***LOCATION***"],"font":"Arial","sl_ics":"one_a","sl_sot":"celsius","cl_bkg":"image","cl_font":"#FFFFFF","cl_cloud":"#FFFFFF","cl_persp":"#81D4FA","cl_sun":"#FFC107","cl_moon":"#FFC107","cl_thund":"#FF5722"}'></div><script async src="https://app2.weatherwidget.org/js/?id=ww_17a90a88b8155"></script></body></html>"##;

pub struct WeatherSource {
    template: String,
    /// Refresh interval in seconds; renders align to wall-clock multiples.
    interval: u64,
    /// Unix timestamp of the next scheduled render; `None` before the first.
    next_update: Option<u64>,
    renderer: Option<Arc<HtmlRenderer>>,
    resolution: Resolution,
}

impl WeatherSource {
    pub fn new(location: Option<&str>, interval: Duration) -> Self {
        let template = match location {
            Some(location) => TEMPLATE_LOC.replace("***LOCATION***", location),
            None => TEMPLATE_AUTO.to_string(),
        };
        Self {
            template,
            interval: interval.as_secs().max(1),
            next_update: None,
            renderer: None,
            resolution: Resolution::new(0, 0),
        }
    }

    fn due(&self, now: u64) -> bool {
        match self.next_update {
            None => true,
            Some(at) => at < now,
        }
    }
}

/// Next wall-clock-aligned refresh after `now`.
fn aligned_next(now: u64, interval: u64) -> u64 {
    now - now % interval + interval
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl ContentSource for WeatherSource {
    fn name(&self) -> &str {
        "weather"
    }

    fn min_interval(&self) -> Option<Duration> {
        match self.next_update {
            None => Some(Duration::ZERO),
            Some(at) => Some(Duration::from_secs(at.saturating_sub(unix_now()))),
        }
    }

    async fn start(&mut self, ctx: &SourceContext) -> anyhow::Result<()> {
        self.resolution = ctx.resolution;
        self.renderer = Some(ctx.resources.get_as::<HtmlRenderer>(HTML_RENDERER).await?);
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.renderer = None;
        Ok(())
    }

    async fn next(&mut self, force: bool) -> anyhow::Result<PollResult> {
        let now = unix_now();
        if !(force || self.due(now)) {
            return Ok(PollResult::Unchanged);
        }

        self.next_update = Some(aligned_next(now, self.interval));

        let renderer = self
            .renderer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("weather source polled before start"))?;
        debug!(next_update = self.next_update, "rendering weather widget");
        let frame = renderer.render(&self.template, self.resolution).await?;
        Ok(PollResult::Frame(frame))
    }
}
