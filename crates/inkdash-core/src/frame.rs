use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Fixed target dimensions of an output sink, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A renderable frame produced by a content source.
///
/// The payload is opaque to the scheduler; only the sink interprets it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub resolution: Resolution,
    pub data: FrameData,
}

#[derive(Debug, Clone)]
pub enum FrameData {
    /// Encoded PNG bytes, as produced by the HTML renderer or read from disk.
    Png(Bytes),
    /// Raw RGBA8 pixels, row-major, no padding.
    Rgba8(Bytes),
}

impl Frame {
    pub fn png(resolution: Resolution, bytes: Bytes) -> Self {
        Self {
            resolution,
            data: FrameData::Png(bytes),
        }
    }

    pub fn rgba8(resolution: Resolution, bytes: Bytes) -> Self {
        Self {
            resolution,
            data: FrameData::Rgba8(bytes),
        }
    }

    /// Payload bytes regardless of encoding.
    pub fn bytes(&self) -> &Bytes {
        match &self.data {
            FrameData::Png(b) | FrameData::Rgba8(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_display() {
        assert_eq!(Resolution::new(800, 480).to_string(), "800x480");
    }

    #[test]
    fn frame_bytes_ignores_encoding() {
        let res = Resolution::new(4, 4);
        let png = Frame::png(res, Bytes::from_static(b"abc"));
        let raw = Frame::rgba8(res, Bytes::from_static(b"abc"));
        assert_eq!(png.bytes(), raw.bytes());
    }
}
