//! Frequency-domain cross-correlation engine.
//!
//! Each engine owns one spatial buffer, one frequency buffer in the
//! real-input FFT layout (`(width/2 + 1) * height`), the band-pass mask, and
//! the transform plans bound to those buffers at construction. Reallocation
//! invalidates the plans, so a resize reconstructs the whole engine. The 2-D
//! transform runs as a real-to-complex pass over rows followed by a complex
//! pass down the columns.

use super::FrameBlock;
use super::preprocess::{PreprocessError, SpatialBuffer};
use super::window::WindowKind;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_ANALYSIS_SIZE: usize = 16;

/// Shape constant of the low-pass factor `exp(a * p)`.
const LOW_PASS_SHAPE: f32 = 6.0;
/// Shape constant of the high-pass factor `1 - exp(b * p)`.
const HIGH_PASS_SHAPE: f32 = 100.0;

/// Configuration for the correlation engine's analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Analysis window width in pixels.
    pub width: usize,
    /// Analysis window height in pixels.
    pub height: usize,
    /// Window taper applied before the forward transform.
    pub window: WindowKind,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            window: WindowKind::Hann,
        }
    }
}

impl CorrelationConfig {
    /// Ensures the configuration respects runtime invariants.
    pub fn normalize(&mut self) {
        self.width = self.width.max(MIN_ANALYSIS_SIZE);
        self.height = self.height.max(MIN_ANALYSIS_SIZE);
    }

    /// Returns a normalized copy of this configuration.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

/// Integer peak location on the correlation surface.
///
/// `x`/`y` are raw buffer indices; `dx`/`dy` are the same location wrapped to
/// signed offsets around the zero-frequency origin. No sub-pixel refinement is
/// applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakOffset {
    pub x: usize,
    pub y: usize,
    pub dx: isize,
    pub dy: isize,
    pub value: f32,
}

/// Legacy frequency-domain focus scores derived from the radial profile.
///
/// Secondary to the Brenner metric; kept for compatibility with recorded
/// calibration data.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralScores {
    pub integral: f64,
    pub ramp: f64,
    pub log_weighted: f64,
    pub gaussian: f64,
    pub tanh: f64,
    pub peak: f64,
    pub noise_floor: f64,
}

pub struct CorrelationEngine {
    config: CorrelationConfig,
    spatial: SpatialBuffer,
    freq: Vec<Complex32>,
    freq_width: usize,
    band_pass: Vec<f32>,
    row_fft: Arc<dyn RealToComplex<f32>>,
    row_ifft: Arc<dyn ComplexToReal<f32>>,
    col_fft: Arc<dyn Fft<f32>>,
    col_ifft: Arc<dyn Fft<f32>>,
    row_input: Vec<f32>,
    row_scratch: Vec<Complex32>,
    row_inverse_scratch: Vec<Complex32>,
    col_buffer: Vec<Complex32>,
    col_scratch: Vec<Complex32>,
    transformed: bool,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig) -> Self {
        let config = config.normalized();
        let (width, height) = (config.width, config.height);
        let freq_width = width / 2 + 1;

        let mut real_planner = RealFftPlanner::<f32>::new();
        let row_fft = real_planner.plan_fft_forward(width);
        let row_ifft = real_planner.plan_fft_inverse(width);

        let mut planner = FftPlanner::<f32>::new();
        let col_fft = planner.plan_fft(height, FftDirection::Forward);
        let col_ifft = planner.plan_fft(height, FftDirection::Inverse);
        let col_scratch_len = col_fft
            .get_inplace_scratch_len()
            .max(col_ifft.get_inplace_scratch_len());

        let row_scratch = row_fft.make_scratch_vec();
        let row_inverse_scratch = row_ifft.make_scratch_vec();

        Self {
            spatial: SpatialBuffer::new(width, height, config.window),
            freq: vec![Complex32::ZERO; freq_width * height],
            freq_width,
            band_pass: build_band_pass_mask(width, height, freq_width),
            row_fft,
            row_ifft,
            col_fft,
            col_ifft,
            row_input: vec![0.0; width],
            row_scratch,
            row_inverse_scratch,
            col_buffer: vec![Complex32::ZERO; height],
            col_scratch: vec![Complex32::ZERO; col_scratch_len],
            transformed: false,
            config,
        }
    }

    pub fn config(&self) -> CorrelationConfig {
        self.config
    }

    #[inline]
    pub fn freq_width(&self) -> usize {
        self.freq_width
    }

    /// The spatial buffer: windowed input after [`transform`](Self::transform),
    /// the correlation surface after [`cross_correlate`](Self::cross_correlate).
    pub fn spatial(&self) -> &SpatialBuffer {
        &self.spatial
    }

    pub fn is_transformed(&self) -> bool {
        self.transformed
    }

    /// Drop the current spectrum, requiring a fresh transform before use.
    pub fn reset(&mut self) {
        self.transformed = false;
    }

    /// Preprocess `frame` and execute the forward transform, leaving the
    /// frequency buffer populated. Returns the frame's mean intensity to seed
    /// the next call's `dc_estimate`.
    pub fn transform(
        &mut self,
        frame: &FrameBlock<'_>,
        dc_estimate: f32,
    ) -> Result<f32, PreprocessError> {
        let new_dc = self.spatial.assign(frame, dc_estimate)?;

        let width = self.config.width;
        let fw = self.freq_width;
        for row in 0..self.config.height {
            self.row_input
                .copy_from_slice(&self.spatial.samples()[row * width..][..width]);
            self.row_fft
                .process_with_scratch(
                    &mut self.row_input,
                    &mut self.freq[row * fw..][..fw],
                    &mut self.row_scratch,
                )
                .expect("real FFT forward transform");
        }
        self.column_pass(false);

        self.transformed = true;
        Ok(new_dc)
    }

    /// Compute the cross-power spectrum `conj(self) * other` into this
    /// engine's frequency buffer, apply the band-pass mask, and inverse
    /// transform. The spatial buffer then holds the correlation surface.
    ///
    /// Both engines must have been transformed with identical dimensions. The
    /// mask is stored squared so a single multiply filters both operands; the
    /// frequency buffer is consumed by the inverse transform.
    pub fn cross_correlate(&mut self, other: &CorrelationEngine) {
        assert_eq!(
            (self.config.width, self.config.height),
            (other.config.width, other.config.height),
            "cross-correlating engines with mismatched analysis windows"
        );
        debug_assert!(self.transformed && other.transformed);

        for ((a, &b), &mask) in self
            .freq
            .iter_mut()
            .zip(&other.freq)
            .zip(&self.band_pass)
        {
            let re = a.re * b.re + a.im * b.im;
            let im = a.im * b.re - a.re * b.im;
            *a = Complex32::new(re * mask, im * mask);
        }

        self.inverse_transform();
        self.transformed = false;
    }

    /// Scan the correlation surface for its maximum.
    ///
    /// Correlation values are non-negative by construction; the scan still
    /// tolerates small negative float residue.
    pub fn peak_offset(&self) -> PeakOffset {
        let width = self.config.width;
        let mut best = f32::MIN;
        let mut best_index = 0usize;
        for (index, &value) in self.spatial.samples().iter().enumerate() {
            if value > best {
                best = value;
                best_index = index;
            }
        }

        let x = best_index % width;
        let y = best_index / width;
        PeakOffset {
            x,
            y,
            dx: wrap_offset(x, width),
            dy: wrap_offset(y, self.config.height),
            value: best,
        }
    }

    /// Collapse the magnitude spectrum to a 1-D radial profile.
    ///
    /// Each bin is `log(|F| + 1)`; the spectrum is folded across its vertical
    /// midline, binned by `max(row, col)`, and each bin is normalized by
    /// `2 * index + 1`.
    pub fn reduce(&self) -> Vec<f32> {
        let fw = self.freq_width;
        let height = self.config.height;
        let len = fw.min(height);
        let mut profile = vec![0.0f32; len];

        for row in 0..height {
            let folded_row = if row > height / 2 { height - row } else { row };
            for col in 0..fw {
                let index = folded_row.max(col);
                if index >= len {
                    continue;
                }
                let magnitude = self.freq[row * fw + col].norm();
                profile[index] += (magnitude + 1.0).ln();
            }
        }

        for (index, bin) in profile.iter_mut().enumerate() {
            *bin /= (2 * index + 1) as f32;
        }
        profile
    }

    /// Legacy spectral focus scores: weighted integrals of the radial profile
    /// above its noise floor, normalized by the profile peak. The noise floor
    /// is the mean of the profile's last quarter.
    pub fn spectral_scores(&self) -> SpectralScores {
        let profile = self.reduce();
        spectral_scores_from_profile(&profile)
    }

    /// Magnitude of the frequency buffer, for diagnostics.
    pub fn spectrum_magnitude(&self) -> Vec<f32> {
        self.freq.iter().map(|c| c.norm()).collect()
    }

    fn inverse_transform(&mut self) {
        self.column_pass(true);

        let width = self.config.width;
        let fw = self.freq_width;
        let spatial = self.spatial.samples_mut();
        for row in 0..self.config.height {
            let spectrum = &mut self.freq[row * fw..][..fw];
            // After the inverse column pass each row is the 1-D spectrum of a
            // real signal; its DC and Nyquist bins carry only float residue in
            // the imaginary part, which the real inverse transform rejects.
            spectrum[0].im = 0.0;
            spectrum[fw - 1].im = 0.0;
            self.row_ifft
                .process_with_scratch(
                    spectrum,
                    &mut spatial[row * width..][..width],
                    &mut self.row_inverse_scratch,
                )
                .expect("real FFT inverse transform");
        }
    }

    fn column_pass(&mut self, inverse: bool) {
        let fft = if inverse {
            Arc::clone(&self.col_ifft)
        } else {
            Arc::clone(&self.col_fft)
        };
        let fw = self.freq_width;
        for col in 0..fw {
            for row in 0..self.config.height {
                self.col_buffer[row] = self.freq[row * fw + col];
            }
            fft.process_with_scratch(&mut self.col_buffer, &mut self.col_scratch);
            for row in 0..self.config.height {
                self.freq[row * fw + col] = self.col_buffer[row];
            }
        }
    }
}

impl std::fmt::Debug for CorrelationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationEngine")
            .field("config", &self.config)
            .field("transformed", &self.transformed)
            .finish()
    }
}

#[inline]
fn wrap_offset(index: usize, len: usize) -> isize {
    if index > len / 2 {
        index as isize - len as isize
    } else {
        index as isize
    }
}

/// Squared band-pass coefficients in the real-input frequency layout.
///
/// Each bin maps to an angular distance `d` from the origin frequency (rows
/// folded so index 0 is the lowest frequency). With `p = cos(d) - 1`, the
/// coefficient is `exp(6p) * (1 - exp(100p))`, stored squared: the mask is
/// applied once to the cross-power spectrum instead of to each operand, which
/// halves the filtering work. Filtering after windowing rather than before is
/// the same deliberate approximation.
fn build_band_pass_mask(width: usize, height: usize, freq_width: usize) -> Vec<f32> {
    let mut mask = Vec::with_capacity(freq_width * height);
    for row in 0..height {
        let fy = if row > height / 2 {
            row as f32 - height as f32
        } else {
            row as f32
        } / height as f32;
        for col in 0..freq_width {
            let fx = col as f32 / width as f32;
            let d = core::f32::consts::TAU * (fx * fx + fy * fy).sqrt();
            let p = d.cos() - 1.0;
            let coeff = (LOW_PASS_SHAPE * p).exp() * (1.0 - (HIGH_PASS_SHAPE * p).exp());
            mask.push(coeff * coeff);
        }
    }
    mask
}

fn spectral_scores_from_profile(profile: &[f32]) -> SpectralScores {
    let len = profile.len();
    if len < 4 {
        return SpectralScores::default();
    }

    let tail_start = len - len / 4;
    let noise_floor = profile[tail_start..]
        .iter()
        .map(|&v| v as f64)
        .sum::<f64>()
        / (len - tail_start) as f64;
    let peak = profile.iter().cloned().fold(f32::MIN, f32::max) as f64;
    if peak <= f64::EPSILON {
        return SpectralScores::default();
    }

    let mut integral = 0.0f64;
    let mut ramp = 0.0f64;
    let mut log_weighted = 0.0f64;
    let mut gaussian = 0.0f64;
    let mut tanh = 0.0f64;

    let center = len as f64 / 4.0;
    let sigma = len as f64 / 8.0;
    let log_norm = (len as f64).ln();

    for (index, &value) in profile.iter().enumerate() {
        let excess = (value as f64 - noise_floor).max(0.0);
        if excess == 0.0 {
            continue;
        }
        let i = index as f64;
        integral += excess;
        ramp += excess * i / len as f64;
        log_weighted += excess * (1.0 + i).ln() / log_norm;
        let z = (i - center) / sigma;
        gaussian += excess * (-z * z).exp();
        tanh += excess * (3.0 * i / len as f64).tanh();
    }

    SpectralScores {
        integral: integral / peak,
        ramp: ramp / peak,
        log_weighted: log_weighted / peak,
        gaussian: gaussian / peak,
        tanh: tanh / peak,
        peak,
        noise_floor,
    }
}
