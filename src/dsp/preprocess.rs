//! Spatial preprocessing: windowed, DC-corrected analysis buffers and the
//! Brenner sharpness metric.
//!
//! A [`SpatialBuffer`] is sized once to the configured analysis window and
//! reused across frames; every `assign` overwrites it in place. Frames must be
//! at least as large as the analysis window; the centered crop never silently
//! truncates on a resolution change, the owner is expected to re-provision.

use super::FrameBlock;
use super::window::{WindowKind, window_coefficients};
use std::sync::Arc;
use thiserror::Error;

/// Default pixel distance used by the Brenner gradient.
pub const DEFAULT_BRENNER_STEP: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("frame {frame_width}x{frame_height} smaller than analysis window {width}x{height}")]
    FrameTooSmall {
        frame_width: usize,
        frame_height: usize,
        width: usize,
        height: usize,
    },
}

/// Owned `width * height` float buffer holding one preprocessed frame.
///
/// Dimensions are fixed at construction; a resize destroys and reconstructs
/// the owner together with any transform plans bound to the buffer.
#[derive(Debug, Clone)]
pub struct SpatialBuffer {
    width: usize,
    height: usize,
    window: Arc<[f32]>,
    data: Vec<f32>,
}

impl SpatialBuffer {
    pub fn new(width: usize, height: usize, window: WindowKind) -> Self {
        Self {
            width,
            height,
            window: window_coefficients(window, width, height),
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub(crate) fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Top-left corner of the centered analysis crop inside `frame`.
    fn crop_origin(&self, frame: &FrameBlock<'_>) -> Result<(usize, usize), PreprocessError> {
        if frame.width < self.width || frame.height < self.height {
            return Err(PreprocessError::FrameTooSmall {
                frame_width: frame.width,
                frame_height: frame.height,
                width: self.width,
                height: self.height,
            });
        }
        Ok(((frame.width - self.width) / 2, (frame.height - self.height) / 2))
    }

    /// Fill the buffer with the windowed, DC-subtracted centered crop.
    ///
    /// `dc_estimate` is the previous frame's mean intensity; subtracting it
    /// instead of the current mean avoids a second full pass before windowing.
    /// Returns the current crop's unwindowed mean to seed the next call.
    pub fn assign(
        &mut self,
        frame: &FrameBlock<'_>,
        dc_estimate: f32,
    ) -> Result<f32, PreprocessError> {
        let (x0, y0) = self.crop_origin(frame)?;

        let mut sum = 0.0f64;
        for row in 0..self.height {
            let src = &frame.pixels[(y0 + row) * frame.width + x0..][..self.width];
            let dst = &mut self.data[row * self.width..][..self.width];
            let win = &self.window[row * self.width..][..self.width];
            for ((out, &pixel), &coeff) in dst.iter_mut().zip(src).zip(win) {
                let value = pixel as f32;
                sum += value as f64;
                *out = (value - dc_estimate) * coeff;
            }
        }

        Ok((sum / self.data.len() as f64) as f32)
    }

    /// Fill the buffer with the unwindowed centered crop, skipping DC and
    /// window processing entirely. This is the input to the sharpness metric.
    pub fn assign_raw(&mut self, frame: &FrameBlock<'_>) -> Result<(), PreprocessError> {
        let (x0, y0) = self.crop_origin(frame)?;

        for row in 0..self.height {
            let src = &frame.pixels[(y0 + row) * frame.width + x0..][..self.width];
            let dst = &mut self.data[row * self.width..][..self.width];
            for (out, &pixel) in dst.iter_mut().zip(src) {
                *out = pixel as f32;
            }
        }
        Ok(())
    }

    /// Brenner sharpness over a centered region of interest.
    ///
    /// `roi_percent` (clamped to 0–100) selects a centered sub-rectangle with
    /// margins of `(100 - roi) / 200` of each dimension. For each pixel the
    /// vertical difference `I(x, y) - I(x, y+step)` and horizontal difference
    /// `I(x+step, y) - I(x, y)` are combined as `max(vertical, horizontal)`
    /// before squaring. The signed max discards sign information
    /// asymmetrically between the axes; this matches the observed metric and
    /// is kept as-is. The sum is normalized by the sub-rectangle's pixel count
    /// so the score is resolution independent.
    pub fn brenner_score(&self, roi_percent: f32, step: usize) -> f64 {
        let roi = roi_percent.clamp(0.0, 100.0);
        let margin = (100.0 - roi) / 200.0;
        let mx = (self.width as f32 * margin) as usize;
        let my = (self.height as f32 * margin) as usize;

        let x1 = self.width - mx;
        let y1 = self.height - my;
        if x1 <= mx + step || y1 <= my + step {
            return 0.0;
        }

        let mut sum = 0.0f64;
        for y in my..y1 - step {
            let row = &self.data[y * self.width..];
            let ahead_row = &self.data[(y + step) * self.width..];
            for x in mx..x1 - step {
                let vertical = row[x] - ahead_row[x];
                let horizontal = row[x + step] - row[x];
                let diff = vertical.max(horizontal) as f64;
                sum += diff * diff;
            }
        }

        let count = ((x1 - mx) * (y1 - my)) as f64;
        sum / count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(pixels: &[u8], width: usize, height: usize) -> FrameBlock<'_> {
        FrameBlock::new(pixels, width, height, Instant::now())
    }

    fn uniform(width: usize, height: usize, value: u8) -> Vec<u8> {
        vec![value; width * height]
    }

    /// Vertical edge at the horizontal midline with the given contrast.
    fn edge_image(width: usize, height: usize, low: u8, high: u8) -> Vec<u8> {
        let mut pixels = vec![low; width * height];
        for row in pixels.chunks_mut(width) {
            for value in &mut row[width / 2..] {
                *value = high;
            }
        }
        pixels
    }

    #[test]
    fn assign_rejects_undersized_frames() {
        let mut buffer = SpatialBuffer::new(64, 64, WindowKind::Hann);
        let pixels = uniform(32, 32, 10);
        let err = buffer.assign(&frame(&pixels, 32, 32), 0.0).unwrap_err();
        assert!(matches!(err, PreprocessError::FrameTooSmall { .. }));
    }

    #[test]
    fn dc_subtraction_zeroes_uniform_frames() {
        let mut buffer = SpatialBuffer::new(32, 32, WindowKind::Hann);
        let pixels = uniform(48, 48, 77);
        let new_dc = buffer.assign(&frame(&pixels, 48, 48), 77.0).unwrap();
        assert!((new_dc - 77.0).abs() < 1e-4);
        assert!(buffer.samples().iter().all(|v| v.abs() < 1e-5));
    }

    #[test]
    fn assign_returns_current_mean_for_next_frame() {
        let mut buffer = SpatialBuffer::new(16, 16, WindowKind::Hann);
        let pixels = uniform(16, 16, 100);
        let dc = buffer.assign(&frame(&pixels, 16, 16), 0.0).unwrap();
        assert!((dc - 100.0).abs() < 1e-4);
    }

    #[test]
    fn assign_raw_copies_crop_verbatim() {
        let width = 8;
        let mut pixels = uniform(width, width, 0);
        for (i, p) in pixels.iter_mut().enumerate() {
            *p = i as u8;
        }
        let mut buffer = SpatialBuffer::new(4, 4, WindowKind::Hann);
        buffer.assign_raw(&frame(&pixels, width, width)).unwrap();
        // Crop origin is (2, 2) for an 8x8 frame and 4x4 window.
        assert_eq!(buffer.samples()[0], (2 * width + 2) as f32);
        assert_eq!(buffer.samples()[5], (3 * width + 3) as f32);
    }

    #[test]
    fn brenner_increases_with_edge_contrast() {
        let mut buffer = SpatialBuffer::new(64, 64, WindowKind::Hann);
        let mut previous = -1.0f64;
        for contrast in [20u8, 60, 120, 240] {
            let pixels = edge_image(64, 64, 10, 10 + contrast);
            buffer.assign_raw(&frame(&pixels, 64, 64)).unwrap();
            let score = buffer.brenner_score(100.0, DEFAULT_BRENNER_STEP);
            assert!(
                score > previous,
                "score {score} did not increase past {previous} at contrast {contrast}"
            );
            previous = score;
        }
    }

    #[test]
    fn brenner_is_zero_on_flat_input() {
        let mut buffer = SpatialBuffer::new(32, 32, WindowKind::Hann);
        let pixels = uniform(32, 32, 128);
        buffer.assign_raw(&frame(&pixels, 32, 32)).unwrap();
        assert_eq!(buffer.brenner_score(80.0, DEFAULT_BRENNER_STEP), 0.0);
    }

    #[test]
    fn brenner_roi_is_clamped() {
        let mut buffer = SpatialBuffer::new(32, 32, WindowKind::Hann);
        let pixels = edge_image(32, 32, 0, 200);
        buffer.assign_raw(&frame(&pixels, 32, 32)).unwrap();
        let clamped = buffer.brenner_score(250.0, DEFAULT_BRENNER_STEP);
        let full = buffer.brenner_score(100.0, DEFAULT_BRENNER_STEP);
        assert_eq!(clamped, full);
    }
}
