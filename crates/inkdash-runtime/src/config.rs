//! TOML configuration for the inkdash binary.
//!
//! Sources are enabled by the presence of their `[sources.*]` table; a
//! missing table simply leaves that source out of the rotation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// File the current frame is written to.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RendererConfig {
    /// Headless browser binary; `chromium` when unset.
    pub browser: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    pub nowplaying: Option<NowPlayingConfig>,
    pub weather: Option<WeatherConfig>,
    pub slideshow: Option<SlideshowConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NowPlayingConfig {
    /// JSON status file maintained by the player daemon.
    pub status_file: PathBuf,
    /// Proactive poll cadence in seconds. `0` disables polling entirely:
    /// the source is then only checked when the rotation is woken, e.g.
    /// by the status-file watcher.
    #[serde(default = "default_nowplaying_poll")]
    pub poll_interval_secs: u64,
    /// Watch the status file and wake the rotation on changes.
    #[serde(default = "default_true")]
    pub watch: bool,
}

impl NowPlayingConfig {
    pub fn poll_interval(&self) -> Option<Duration> {
        match self.poll_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    /// Widget location id; auto-detect by IP when unset.
    pub location: Option<String>,
    #[serde(default = "default_hourly")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlideshowConfig {
    /// Directory of PNG images.
    pub path: PathBuf,
    #[serde(default = "default_hourly")]
    pub interval_secs: u64,
}

fn default_output() -> PathBuf {
    PathBuf::from("frame.png")
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    480
}

fn default_nowplaying_poll() -> u64 {
    1
}

fn default_hourly() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}
