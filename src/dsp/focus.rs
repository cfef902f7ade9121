//! Focus-quality extraction.
//!
//! The Brenner sharpness metric is the primary score and runs on an
//! unwindowed spatial buffer only. The legacy frequency-domain scores are
//! optional: enabling them attaches a correlation engine by composition, so
//! the focus-only pipeline never carries frequency-domain state it does not
//! use.

use super::correlation::{CorrelationConfig, CorrelationEngine, SpectralScores};
use super::preprocess::{DEFAULT_BRENNER_STEP, SpatialBuffer};
use super::window::WindowKind;
use super::{FrameBlock, FrameProcessor, ProcessorUpdate, Reconfigurable};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

/// Scalar focus scores derived from one frame. No cross-frame state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusSnapshot {
    /// Brenner sharpness, the primary and currently used metric.
    pub brenner: f64,
    /// Legacy spectral scores, present only when enabled.
    pub spectral: Option<SpectralScores>,
    pub captured_at: Instant,
}

/// Configuration for the focus extraction processor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Analysis window width in pixels.
    pub width: usize,
    /// Analysis window height in pixels.
    pub height: usize,
    /// Centered region-of-interest percentage for the Brenner metric (0-100).
    pub roi_percent: f32,
    /// Pixel distance of the Brenner gradient.
    pub brenner_step: usize,
    /// Compute the legacy frequency-domain scores as well.
    pub enable_spectral: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            roi_percent: 75.0,
            brenner_step: DEFAULT_BRENNER_STEP,
            enable_spectral: false,
        }
    }
}

impl FocusConfig {
    /// Ensures the configuration respects runtime invariants.
    pub fn normalize(&mut self) {
        self.width = self.width.max(16);
        self.height = self.height.max(16);
        self.roi_percent = if self.roi_percent.is_finite() {
            self.roi_percent.clamp(0.0, 100.0)
        } else {
            75.0
        };
        self.brenner_step = self.brenner_step.max(1);
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

pub struct FocusProcessor {
    config: FocusConfig,
    raw: SpatialBuffer,
    engine: Option<CorrelationEngine>,
    dc_estimate: f32,
}

impl FocusProcessor {
    pub fn new(config: FocusConfig) -> Self {
        let config = config.normalized();
        Self {
            raw: SpatialBuffer::new(config.width, config.height, WindowKind::Rectangular),
            engine: config.enable_spectral.then(|| {
                CorrelationEngine::new(CorrelationConfig {
                    width: config.width,
                    height: config.height,
                    window: WindowKind::Hann,
                })
            }),
            dc_estimate: 0.0,
            config,
        }
    }

    pub fn config(&self) -> FocusConfig {
        self.config
    }
}

impl FrameProcessor for FocusProcessor {
    type Output = FocusSnapshot;

    fn process_frame(&mut self, frame: &FrameBlock<'_>) -> ProcessorUpdate<Self::Output> {
        if let Err(err) = self.raw.assign_raw(frame) {
            warn!("[focus] skipping frame: {err}");
            return ProcessorUpdate::None;
        }

        let brenner = self
            .raw
            .brenner_score(self.config.roi_percent, self.config.brenner_step);

        let spectral = match &mut self.engine {
            Some(engine) => match engine.transform(frame, self.dc_estimate) {
                Ok(dc) => {
                    self.dc_estimate = dc;
                    Some(engine.spectral_scores())
                }
                Err(err) => {
                    warn!("[focus] spectral pass skipped: {err}");
                    None
                }
            },
            None => None,
        };

        ProcessorUpdate::Snapshot(FocusSnapshot {
            brenner,
            spectral,
            captured_at: frame.timestamp,
        })
    }

    fn reset(&mut self) {
        self.dc_estimate = 0.0;
    }
}

impl Reconfigurable<FocusConfig> for FocusProcessor {
    fn update_config(&mut self, config: FocusConfig) {
        *self = FocusProcessor::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_frame(width: usize, height: usize, contrast: u8) -> Vec<u8> {
        let mut pixels = vec![20u8; width * height];
        for row in pixels.chunks_mut(width) {
            for value in &mut row[width / 2..] {
                *value = 20 + contrast;
            }
        }
        pixels
    }

    #[test]
    fn produces_brenner_snapshot_without_spectral_state() {
        let mut processor = FocusProcessor::new(FocusConfig {
            width: 32,
            height: 32,
            ..FocusConfig::default()
        });
        assert!(processor.engine.is_none());

        let pixels = edge_frame(32, 32, 200);
        let frame = FrameBlock::new(&pixels, 32, 32, Instant::now());
        match processor.process_frame(&frame) {
            ProcessorUpdate::Snapshot(snapshot) => {
                assert!(snapshot.brenner > 0.0);
                assert!(snapshot.spectral.is_none());
            }
            ProcessorUpdate::None => panic!("expected snapshot"),
        }
    }

    #[test]
    fn spectral_scores_attach_when_enabled() {
        let mut processor = FocusProcessor::new(FocusConfig {
            width: 32,
            height: 32,
            enable_spectral: true,
            ..FocusConfig::default()
        });

        let pixels = edge_frame(32, 32, 180);
        let frame = FrameBlock::new(&pixels, 32, 32, Instant::now());
        match processor.process_frame(&frame) {
            ProcessorUpdate::Snapshot(snapshot) => {
                let spectral = snapshot.spectral.expect("spectral scores enabled");
                assert!(spectral.peak > 0.0);
            }
            ProcessorUpdate::None => panic!("expected snapshot"),
        }
    }

    #[test]
    fn undersized_frames_are_skipped() {
        let mut processor = FocusProcessor::new(FocusConfig {
            width: 64,
            height: 64,
            ..FocusConfig::default()
        });
        let pixels = edge_frame(32, 32, 100);
        let frame = FrameBlock::new(&pixels, 32, 32, Instant::now());
        assert_eq!(processor.process_frame(&frame), ProcessorUpdate::None);
    }
}
