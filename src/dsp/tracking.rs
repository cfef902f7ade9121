//! Lateral drift tracking via frequency-domain cross-correlation.
//!
//! A tracker holds two correlation engines: a reference anchored on one frame
//! and a live engine consumed by each correlation. Processing is synchronous
//! and single-threaded per frame; the engines' buffers are mutated in place
//! and a tracker instance must not see overlapping frames.

use super::correlation::{CorrelationConfig, CorrelationEngine};
use super::{FrameBlock, FrameProcessor, ProcessorUpdate, Reconfigurable};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Per-frame drift estimate relative to the anchored reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSnapshot {
    /// Horizontal drift in pixels (positive = content moved right).
    pub dx: isize,
    /// Vertical drift in pixels (positive = content moved down).
    pub dy: isize,
    /// Correlation-surface peak value, a crude confidence measure.
    pub peak: f32,
    pub captured_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub correlation: CorrelationConfig,
    /// Re-anchor the reference every N processed frames (0 = never).
    pub reanchor_interval: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            correlation: CorrelationConfig::default(),
            reanchor_interval: 0,
        }
    }
}

impl TrackingConfig {
    pub fn normalize(&mut self) {
        self.correlation.normalize();
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

pub struct TrackerProcessor {
    config: TrackingConfig,
    reference: CorrelationEngine,
    live: CorrelationEngine,
    dc_estimate: f32,
    frames_since_anchor: usize,
}

impl TrackerProcessor {
    pub fn new(config: TrackingConfig) -> Self {
        let config = config.normalized();
        Self {
            reference: CorrelationEngine::new(config.correlation),
            live: CorrelationEngine::new(config.correlation),
            dc_estimate: 0.0,
            frames_since_anchor: 0,
            config,
        }
    }

    pub fn config(&self) -> TrackingConfig {
        self.config
    }

    /// Re-anchor the reference on the given frame. Subsequent offsets are
    /// measured against it.
    pub fn anchor(&mut self, frame: &FrameBlock<'_>) -> bool {
        match self.reference.transform(frame, self.dc_estimate) {
            Ok(dc) => {
                self.dc_estimate = dc;
                self.frames_since_anchor = 0;
                debug!("[tracking] reference anchored");
                true
            }
            Err(err) => {
                warn!("[tracking] anchor failed: {err}");
                false
            }
        }
    }
}

impl FrameProcessor for TrackerProcessor {
    type Output = TrackingSnapshot;

    fn process_frame(&mut self, frame: &FrameBlock<'_>) -> ProcessorUpdate<Self::Output> {
        if !self.reference.is_transformed() {
            self.anchor(frame);
            return ProcessorUpdate::None;
        }

        match self.live.transform(frame, self.dc_estimate) {
            Ok(dc) => self.dc_estimate = dc,
            Err(err) => {
                warn!("[tracking] skipping frame: {err}");
                return ProcessorUpdate::None;
            }
        }

        self.live.cross_correlate(&self.reference);
        let peak = self.live.peak_offset();
        self.frames_since_anchor += 1;

        // The surface is conj(live) * reference: its peak sits at the lag
        // that maps the live frame back onto the reference, so the drift of
        // the live frame is the negated peak position.
        let snapshot = TrackingSnapshot {
            dx: -peak.dx,
            dy: -peak.dy,
            peak: peak.value,
            captured_at: frame.timestamp,
        };

        if self.config.reanchor_interval > 0
            && self.frames_since_anchor >= self.config.reanchor_interval
        {
            self.anchor(frame);
        }

        ProcessorUpdate::Snapshot(snapshot)
    }

    fn reset(&mut self) {
        self.reference.reset();
        self.live.reset();
        self.dc_estimate = 0.0;
        self.frames_since_anchor = 0;
    }
}

impl Reconfigurable<TrackingConfig> for TrackerProcessor {
    fn update_config(&mut self, config: TrackingConfig) {
        *self = TrackerProcessor::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::window::WindowKind;

    const SIZE: usize = 32;

    fn tracker() -> TrackerProcessor {
        TrackerProcessor::new(TrackingConfig {
            correlation: CorrelationConfig {
                width: SIZE,
                height: SIZE,
                window: WindowKind::Hann,
            },
            reanchor_interval: 0,
        })
    }

    fn pattern(seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(747_796_405).wrapping_add(1);
        (0..SIZE * SIZE)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect()
    }

    fn rolled(pixels: &[u8], sx: usize, sy: usize) -> Vec<u8> {
        let mut out = vec![0u8; pixels.len()];
        for y in 0..SIZE {
            for x in 0..SIZE {
                out[((y + sy) % SIZE) * SIZE + (x + sx) % SIZE] = pixels[y * SIZE + x];
            }
        }
        out
    }

    #[test]
    fn first_frame_anchors_without_snapshot() {
        let mut tracker = tracker();
        let pixels = pattern(1);
        let frame = FrameBlock::new(&pixels, SIZE, SIZE, Instant::now());
        assert_eq!(tracker.process_frame(&frame), ProcessorUpdate::None);
        assert!(tracker.reference.is_transformed());
    }

    #[test]
    fn stationary_scene_reports_zero_drift() {
        let mut tracker = tracker();
        let pixels = pattern(5);
        let frame = FrameBlock::new(&pixels, SIZE, SIZE, Instant::now());
        tracker.process_frame(&frame);
        match tracker.process_frame(&frame) {
            ProcessorUpdate::Snapshot(s) => assert_eq!((s.dx, s.dy), (0, 0)),
            ProcessorUpdate::None => panic!("expected snapshot"),
        }
    }

    #[test]
    fn rolled_scene_reports_negated_peak_as_drift() {
        let mut tracker = tracker();
        let pixels = pattern(9);
        let moved = rolled(&pixels, 4, 2);

        let anchor = FrameBlock::new(&pixels, SIZE, SIZE, Instant::now());
        tracker.process_frame(&anchor);

        let live = FrameBlock::new(&moved, SIZE, SIZE, Instant::now());
        match tracker.process_frame(&live) {
            ProcessorUpdate::Snapshot(s) => assert_eq!((s.dx, s.dy), (4, 2)),
            ProcessorUpdate::None => panic!("expected snapshot"),
        }
    }

    #[test]
    fn reset_drops_the_anchor() {
        let mut tracker = tracker();
        let pixels = pattern(13);
        let frame = FrameBlock::new(&pixels, SIZE, SIZE, Instant::now());
        tracker.process_frame(&frame);
        tracker.reset();
        assert!(!tracker.reference.is_transformed());
        assert_eq!(tracker.process_frame(&frame), ProcessorUpdate::None);
    }
}
