//! Core scaffolding for the per-frame analysis processors.
//!
//! This module only provides the contracts and lightweight plumbing shared by
//! the focus and tracking pipelines. Implementations can iterate on these
//! building blocks without reshaping the public surface area.

pub mod correlation;
pub mod focus;
pub mod preprocess;
pub mod tracking;
pub mod window;

use std::time::Instant;

/// Borrowed 8-bit grayscale frame handed to the frame processors.
#[derive(Debug, Clone, Copy)]
pub struct FrameBlock<'a> {
    /// Row-major intensity samples, one byte per pixel.
    pub pixels: &'a [u8],
    /// Frame width in pixels.
    pub width: usize,
    /// Frame height in pixels.
    pub height: usize,
    /// Capture timestamp from the upstream acquisition pipeline.
    pub timestamp: Instant,
}

impl<'a> FrameBlock<'a> {
    pub fn new(pixels: &'a [u8], width: usize, height: usize, timestamp: Instant) -> Self {
        debug_assert_eq!(pixels.len(), width * height, "frame buffer size mismatch");
        Self {
            pixels,
            width,
            height,
            timestamp,
        }
    }

    /// Returns the total pixel count of the frame.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Output emitted by a processor after consuming a [`FrameBlock`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorUpdate<T> {
    /// No new result is ready for downstream consumers.
    None,
    /// A fresh snapshot is available.
    Snapshot(T),
}

/// Shared contract implemented by the frame-analysis modules.
///
/// A processor mutates its internal buffers in place and must not be invoked
/// concurrently on overlapping frames.
pub trait FrameProcessor {
    type Output;

    /// Consume a frame and optionally output an updated snapshot.
    fn process_frame(&mut self, frame: &FrameBlock<'_>) -> ProcessorUpdate<Self::Output>;

    /// Reset the processor, clearing any accumulated history.
    fn reset(&mut self);
}

/// Optional helper trait for processors that expose lightweight configuration updates.
pub trait Reconfigurable<Cfg> {
    fn update_config(&mut self, config: Cfg);
}
