//! Now-playing card: polls a media-player client and renders a cover card
//! through the shared HTML renderer whenever the track changes.
//!
//! The source de-duplicates on the track id: having won the previous cycle
//! (`force = false`) it only re-renders on a real track change, while a
//! forced poll re-emits unconditionally so the card comes back after
//! another source held the display.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use inkdash_core::{ContentSource, PollResult, Resolution, SourceContext};
use inkdash_render::{HTML_RENDERER, HtmlRenderer};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Playback state reported by a media player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Boundary to the concrete media service. Implementations report `None`
/// when nothing is actively playing.
#[async_trait]
pub trait NowPlayingClient: Send + Sync {
    async fn now_playing(&self) -> anyhow::Result<Option<NowPlaying>>;
}

/// On-disk wire format of the player daemon's status file.
#[derive(Debug, Deserialize)]
struct StatusFile {
    state: String,
    #[serde(default)]
    track: Option<NowPlaying>,
}

/// Production client reading the JSON status file a local player daemon
/// keeps up to date. A missing file simply means the player is not running.
pub struct StatusFileClient {
    path: PathBuf,
}

impl StatusFileClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NowPlayingClient for StatusFileClient {
    async fn now_playing(&self) -> anyhow::Result<Option<NowPlaying>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let status: StatusFile = serde_json::from_slice(&raw)?;
        if status.state == "playing" {
            Ok(status.track)
        } else {
            Ok(None)
        }
    }
}

const CARD_TEMPLATE: &str = r#"
<html>
    <head>
        <style type="text/css">
            body {
                width: 100%;
                height: 100%;
                margin: 0px;
                ***BACKGROUND***
                background-size: cover;
                background-position: center center;
                font-family: sans-serif;
            }

            h1, h2 {
                width: 100%;
                margin: 0;
                color: white;
                text-shadow: 5px 5px #1c171c;
            }

            h1 { font-size: 10vh; }
            h2 { font-size: 7vh; }

            footer {
                padding: 0 0 2.5vh 5vw;
                position: absolute;
                bottom: 0;
                left: 0;
                right: 0;
            }
        </style>
    </head>
    <body>
        <footer>
            <h1>***TITLE***</h1>
            <h2>***ARTIST***</h2>
        </footer>
    </body>
</html>
"#;

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn build_card(np: &NowPlaying) -> String {
    let background = match &np.cover_url {
        Some(url) => format!(
            "background-image: url(\"{}\");",
            url.replace('"', "%22")
        ),
        None => "background: linear-gradient(#1c171c, #3a2f3a);".to_string(),
    };
    CARD_TEMPLATE
        .replace("***BACKGROUND***", &background)
        .replace("***TITLE***", &html_escape(&np.title))
        .replace("***ARTIST***", &html_escape(&np.artist))
}

pub struct NowPlayingSource {
    client: Box<dyn NowPlayingClient>,
    /// `None` makes this a pure push source: no proactive cadence, checked
    /// only when the rotation is woken (e.g. by the status-file watcher).
    poll_interval: Option<Duration>,
    last_id: Option<String>,
    renderer: Option<Arc<HtmlRenderer>>,
    resolution: Resolution,
}

impl NowPlayingSource {
    pub fn new(client: Box<dyn NowPlayingClient>, poll_interval: Option<Duration>) -> Self {
        Self {
            client,
            poll_interval,
            last_id: None,
            renderer: None,
            resolution: Resolution::new(0, 0),
        }
    }

    fn should_render(&self, force: bool, track_id: &str) -> bool {
        force || self.last_id.as_deref() != Some(track_id)
    }
}

#[async_trait]
impl ContentSource for NowPlayingSource {
    fn name(&self) -> &str {
        "now-playing"
    }

    fn min_interval(&self) -> Option<Duration> {
        self.poll_interval
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
        let np = match self.client.now_playing().await {
            Ok(np) => np,
            Err(e) => {
                // Player hiccups should not halt the rotation.
                warn!(error = %format!("{e:#}"), "now-playing client failed");
                return Ok(PollResult::Skip);
            }
        };

        match np {
            Some(np) if self.should_render(force, &np.track_id) => {
                let renderer = self
                    .renderer
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("now-playing source polled before start"))?;
                debug!(track = %np.title, artist = %np.artist, "rendering now-playing card");
                let frame = renderer.render(&build_card(&np), self.resolution).await?;
                self.last_id = Some(np.track_id);
                Ok(PollResult::Frame(frame))
            }
            Some(_) => Ok(PollResult::Unchanged),
            None => {
                self.last_id = None;
                Ok(PollResult::Skip)
            }
        }
    }
}
