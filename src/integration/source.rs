//! Video source seam.

use std::collections::VecDeque;
use std::convert::Infallible;

use image::RgbImage;

/// Stream properties reported by a [`VideoSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Sequential frame reader: a file decoder, a network stream, a test fixture.
pub trait VideoSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn info(&self) -> StreamInfo;

    /// Next decoded frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, Self::Error>;
}

/// Frames held in memory, replayed in order.
#[derive(Debug, Clone)]
pub struct MemorySource {
    info: StreamInfo,
    frames: VecDeque<RgbImage>,
}

impl MemorySource {
    pub fn new(fps: f64, frames: impl IntoIterator<Item = RgbImage>) -> Self {
        let frames: VecDeque<RgbImage> = frames.into_iter().collect();
        let (width, height) = frames.front().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            info: StreamInfo { width, height, fps },
            frames,
        }
    }

    /// `count` black frames of the given size.
    pub fn blank(width: u32, height: u32, fps: f64, count: usize) -> Self {
        Self::new(fps, (0..count).map(|_| RgbImage::new(width, height)))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl VideoSource for MemorySource {
    type Error = Infallible;

    fn info(&self) -> StreamInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, Self::Error> {
        Ok(self.frames.pop_front())
    }
}
