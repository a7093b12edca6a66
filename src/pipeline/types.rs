//! Core types moved between pipeline stages.

use bytes::Bytes;
use std::time::Duration;

/// Pixel layout of an in-memory frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit RGBA, 4 bytes per pixel, row-major, no stride padding. The
    /// working layout between decode and encode.
    Rgba,
    /// Planar YUV 4:2:0, the encoder-native layout.
    Yuv420p,
}

impl PixelLayout {
    pub fn bytes_per_frame(&self, width: usize, height: usize) -> usize {
        match self {
            PixelLayout::Rgba => width * height * 4,
            PixelLayout::Yuv420p => width * height + (width / 2) * (height / 2) * 2,
        }
    }
}

/// One uncompressed frame owned by exactly one pipeline stage at a time.
#[derive(Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
    /// Presentation order, assigned by the pipeline. Monotonically
    /// increasing, one unit per tick.
    pub pts: i64,
}

impl Frame {
    pub fn rgba(width: usize, height: usize, data: Vec<u8>) -> Frame {
        Frame {
            width,
            height,
            layout: PixelLayout::Rgba,
            data,
            pts: 0,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("pts", &self.pts)
            .field("size", &self.data.len())
            .finish()
    }
}

/// One encoded packet ready for the outbound track.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub data: Bytes,
    pub pts: i64,
    /// Fixed per-sample duration, equal to the pipeline tick.
    pub duration: Duration,
}

/// Result of polling the frame source. "No data yet" and "end of stream"
/// are control flow, not errors.
#[derive(Debug)]
pub enum SourceStatus {
    Ready(Frame),
    /// Nothing decodable right now; try again next tick.
    Pending,
    /// The source is drained and will never produce another frame.
    Exhausted,
}
