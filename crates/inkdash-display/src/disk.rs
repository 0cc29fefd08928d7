//! Save-to-disk sink: writes every presented frame to a fixed path.
//! Useful headless (a web server or photo frame picks the file up) and as
//! the development stand-in for real display hardware.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use inkdash_core::{Frame, Resolution, Sink};

const DEFAULT_RESOLUTION: Resolution = Resolution::new(800, 480);

pub struct DiskSink {
    path: PathBuf,
    resolution: Resolution,
}

impl DiskSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolution: DEFAULT_RESOLUTION,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }
}

#[async_trait]
impl Sink for DiskSink {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Write-then-rename so readers never observe a half-written frame.
    async fn present(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, frame.bytes())
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        debug!(path = %self.path.display(), size = frame.bytes().len(), "frame written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn present_writes_the_frame_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot.png");
        let mut sink = DiskSink::new(&path);
        sink.start().await.unwrap();

        let frame = Frame::png(sink.resolution(), Bytes::from_static(b"frame-bytes"));
        sink.present(&frame).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"frame-bytes");
        assert!(!path.with_extension("tmp").exists(), "temp file must be renamed away");
    }

    #[tokio::test]
    async fn present_replaces_the_previous_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screenshot.png");
        let mut sink = DiskSink::new(&path);
        sink.start().await.unwrap();

        let res = sink.resolution();
        sink.present(&Frame::png(res, Bytes::from_static(b"one"))).await.unwrap();
        sink.present(&Frame::png(res, Bytes::from_static(b"two"))).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"two");
    }

    #[tokio::test]
    async fn start_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/screenshot.png");
        let mut sink = DiskSink::new(&path);
        sink.start().await.unwrap();

        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn resolution_defaults_to_epd_dimensions() {
        let sink = DiskSink::new("out.png");
        assert_eq!(sink.resolution(), Resolution::new(800, 480));

        let sink = sink.with_resolution(Resolution::new(640, 400));
        assert_eq!(sink.resolution(), Resolution::new(640, 400));
    }
}
