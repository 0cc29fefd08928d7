//! Shared HTML-to-frame renderer backed by a headless browser.
//!
//! Registered in the resource registry under [`HTML_RENDERER`] so that any
//! source needing rasterized HTML (now-playing cards, weather widgets)
//! shares one configuration without knowing about the others.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use inkdash_core::{Frame, Resolution, ResourceKind, ResourceProvider, SharedResource};

/// Registry key for the shared renderer.
pub const HTML_RENDERER: ResourceKind = ResourceKind::new("html-renderer");

const DEFAULT_BROWSER: &str = "chromium";

/// Renders an HTML document to a PNG frame by driving a headless browser
/// subprocess. Each render is an isolated browser invocation with a
/// throwaway profile; there is no long-lived browser to tear down.
pub struct HtmlRenderer {
    browser: String,
}

impl HtmlRenderer {
    pub fn new(browser: impl Into<String>) -> Self {
        Self {
            browser: browser.into(),
        }
    }

    pub async fn render(&self, html: &str, resolution: Resolution) -> anyhow::Result<Frame> {
        let workdir = tempfile::tempdir().context("creating renderer scratch dir")?;
        let page = workdir.path().join("page.html");
        let shot = workdir.path().join("shot.png");
        tokio::fs::write(&page, html)
            .await
            .context("writing page to scratch dir")?;

        self.screenshot(&page, &shot, resolution).await?;

        let bytes = tokio::fs::read(&shot)
            .await
            .context("reading browser screenshot")?;
        debug!(size = bytes.len(), %resolution, "rendered html frame");
        Ok(Frame::png(resolution, bytes.into()))
    }

    async fn screenshot(
        &self,
        page: &Path,
        shot: &Path,
        resolution: Resolution,
    ) -> anyhow::Result<()> {
        let profile = tempfile::tempdir().context("creating browser profile dir")?;
        let output = Command::new(&self.browser)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-sandbox")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!(
                "--window-size={},{}",
                resolution.width, resolution.height
            ))
            .arg(format!("--screenshot={}", shot.display()))
            .arg(format!("file://{}", page.display()))
            .output()
            .await
            .with_context(|| format!("spawning `{}`", self.browser))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "`{}` exited with {}: {}",
                self.browser,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// Provider registered by the runtime. Startup probes the browser binary so
/// a misconfigured path fails on first use instead of mid-render.
pub struct HtmlRendererProvider {
    browser: String,
}

impl HtmlRendererProvider {
    pub fn new(browser: Option<&str>) -> Self {
        Self {
            browser: browser.unwrap_or(DEFAULT_BROWSER).to_string(),
        }
    }
}

#[async_trait]
impl ResourceProvider for HtmlRendererProvider {
    async fn start(&self) -> anyhow::Result<SharedResource> {
        let probe = Command::new(&self.browser)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("browser `{}` not runnable", self.browser))?;
        debug!(
            browser = %self.browser,
            version = %String::from_utf8_lossy(&probe.stdout).trim(),
            "html renderer ready"
        );
        Ok(std::sync::Arc::new(HtmlRenderer::new(self.browser.clone())))
    }

    async fn stop(&self) -> anyhow::Result<()> {
        // Browser invocations are per-render; nothing stays running.
        Ok(())
    }
}
