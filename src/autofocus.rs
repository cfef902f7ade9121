//! Autofocus calibration protocol.
//!
//! A sweep steps the focal axis across a configured span, aggregates
//! repeated focus measurements at every step to suppress motion-timing
//! jitter, fits the focus response curve to the collected table, and derives
//! threshold-based correction distances for live use.
//!
//! The controller is an explicit state machine: every measurement call
//! returns an outcome the caller observes, and completion is never signaled
//! from inside a handler. Stage motion is blocking; sweeps are a
//! calibration-time operation, not the live tracking hot path.

use crate::fit::{CurveFitter, CurveModel};
use crate::hw::Stage;
use crate::sink::{FocusSink, MeasurementRow, StepRow};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Samples discarded from the front of each per-step buffer; the earliest
/// frames are the most likely to straddle the preceding motion.
const LEADING_DISCARD: usize = 2;
/// Samples discarded from the back of each per-step buffer.
const TRAILING_DISCARD: usize = 1;
/// Smallest per-step sample count that still leaves data after the trim.
const MIN_SAMPLES_PER_STEP: usize = 5;

/// One aggregated entry of the z-stack table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZSample {
    /// Absolute axis position the scores were measured at.
    pub position: f64,
    /// Mean focus score after the per-step trim.
    pub score: f64,
    /// Standard deviation of the retained samples.
    pub noise: f64,
}

/// Ordered `(position, score, noise)` triplets from one monotonic sweep,
/// with a cached index of the maximum-score entry.
///
/// Mutated only by [`push`](Self::push); cleared at the start of each sweep;
/// read-only during curve fitting and lookups.
#[derive(Debug, Clone, Default)]
pub struct ZStackTable {
    samples: Vec<ZSample>,
    max_index: usize,
}

impl ZStackTable {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[ZSample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.max_index = 0;
    }

    pub fn push(&mut self, sample: ZSample) {
        if self.samples.is_empty() || sample.score > self.samples[self.max_index].score {
            self.max_index = self.samples.len();
        }
        self.samples.push(sample);
    }

    pub fn max_index(&self) -> usize {
        self.max_index
    }

    pub fn max_entry(&self) -> Option<&ZSample> {
        self.samples.get(self.max_index)
    }

    pub fn positions(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.position).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.score).collect()
    }

    /// Noise of the entry whose score is nearest to `score`, searching from
    /// the maximum-score index outward so the lookup stays on one monotonic
    /// side of the peak.
    pub fn noise_near_score(&self, score: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for sample in &self.samples[self.max_index..] {
            let distance = (sample.score - score).abs();
            match best {
                Some((current, _)) if current <= distance => {}
                _ => best = Some((distance, sample.noise)),
            }
        }
        best.map(|(_, noise)| noise)
    }

    /// Noise of the entry whose position is nearest to `position`.
    pub fn noise_at_position(&self, position: f64) -> Option<f64> {
        self.samples
            .iter()
            .min_by(|a, b| {
                let da = (a.position - position).abs();
                let db = (b.position - position).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|s| s.noise)
    }
}

/// Sweep protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    /// Stepping outward and aggregating measurements.
    Sweeping,
    /// All steps collected, awaiting [`AutofocusController::finish_sweep`].
    SweepComplete,
    /// Returned, fitted, queries available.
    Ready,
}

/// Why a measurement was discarded. Expected steady-state conditions under
/// asynchronous hardware timing, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Captured before the stage settled (minus the exposure duration).
    Stale,
    /// The stage reports in-motion.
    StageMoving,
    /// No sweep is accepting measurements.
    SweepInactive,
    /// The table already holds the requested number of steps.
    SweepComplete,
}

/// Result of feeding one measurement to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementOutcome {
    Rejected(RejectReason),
    /// Accumulated into the current step's buffer.
    Accumulated { collected: usize },
    /// A step was aggregated and appended; the stage has advanced.
    StepComplete { step: usize, of: usize },
    /// The final step was appended; call `finish_sweep`.
    SweepComplete,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("sweep already in progress")]
    AlreadyActive,
    #[error("step size must be positive, got {0}")]
    InvalidStepSize(f64),
    #[error("sweep span must be positive, got {0}")]
    InvalidSpan(f64),
    #[error("no completed sweep to finish")]
    NotComplete,
}

/// Configuration for the calibration sweep and its derived queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutofocusConfig {
    /// Measurements accumulated per step before aggregation.
    pub samples_per_step: usize,
    /// Upper correction threshold as a fraction of the maximum score.
    pub upper_threshold: f64,
    /// Lower correction threshold as a fraction of the maximum score.
    pub lower_threshold: f64,
    /// Empirical width seed for the fit, in units of the sweep step size.
    pub width_guess_steps: f64,
    /// Floor applied to the empirical offset seed.
    pub min_offset_guess: f64,
    /// Response model fitted to the table.
    pub model: CurveModel,
}

impl Default for AutofocusConfig {
    fn default() -> Self {
        Self {
            samples_per_step: 7,
            upper_threshold: 0.85,
            lower_threshold: 0.02,
            width_guess_steps: 4.0,
            min_offset_guess: 0.1,
            model: CurveModel::GaussianWithOffset,
        }
    }
}

impl AutofocusConfig {
    /// Ensures the configuration respects runtime invariants.
    pub fn normalize(&mut self) {
        self.samples_per_step = self.samples_per_step.max(MIN_SAMPLES_PER_STEP);
        if !self.upper_threshold.is_finite() {
            self.upper_threshold = 0.85;
        }
        if !self.lower_threshold.is_finite() {
            self.lower_threshold = 0.02;
        }
        self.upper_threshold = self.upper_threshold.clamp(0.0, 1.0);
        self.lower_threshold = self.lower_threshold.clamp(0.0, self.upper_threshold);
        self.width_guess_steps = self.width_guess_steps.max(0.5);
        self.min_offset_guess = self.min_offset_guess.max(f64::EPSILON);
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

pub struct AutofocusController {
    config: AutofocusConfig,
    phase: SweepPhase,
    table: ZStackTable,
    fitter: CurveFitter,
    fit_valid: bool,
    step_size: f64,
    half_span: f64,
    total_steps: usize,
    settled_at: Option<Instant>,
    step_scores: Vec<f64>,
    sink: Option<Box<dyn FocusSink>>,
}

impl AutofocusController {
    pub fn new(config: AutofocusConfig) -> Self {
        let config = config.normalized();
        Self {
            fitter: CurveFitter::new(config.model),
            phase: SweepPhase::Idle,
            table: ZStackTable::default(),
            fit_valid: false,
            step_size: 0.0,
            half_span: 0.0,
            total_steps: 0,
            settled_at: None,
            step_scores: Vec::new(),
            sink: None,
            config,
        }
    }

    /// Attach an optional persistence sink. The controller works identically
    /// without one.
    pub fn with_sink(mut self, sink: Option<Box<dyn FocusSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> AutofocusConfig {
        self.config
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SweepPhase::Ready
    }

    /// Whether the last fit converged with physically valid parameters.
    pub fn fit_valid(&self) -> bool {
        self.fit_valid
    }

    pub fn table(&self) -> &ZStackTable {
        &self.table
    }

    pub fn fitter(&self) -> &CurveFitter {
        &self.fitter
    }

    /// Begin a sweep: clear the table, move to the lower sweep edge (half
    /// the span below the presumed in-focus position, blocking), and stamp
    /// the stage as settled. Returns the number of steps the sweep will
    /// collect.
    pub fn start_sweep(
        &mut self,
        stage: &mut dyn Stage,
        step_size: f64,
        total_span: f64,
    ) -> Result<usize, SweepError> {
        if matches!(self.phase, SweepPhase::Sweeping | SweepPhase::SweepComplete) {
            return Err(SweepError::AlreadyActive);
        }
        if !(step_size > 0.0) {
            return Err(SweepError::InvalidStepSize(step_size));
        }
        if !(total_span > 0.0) {
            return Err(SweepError::InvalidSpan(total_span));
        }

        self.table.clear();
        self.step_scores.clear();
        self.fit_valid = false;
        self.step_size = step_size;
        self.half_span = total_span / 2.0;
        self.total_steps = (total_span / step_size).ceil().max(1.0) as usize;

        info!(
            "[autofocus] sweep start: {} steps of {step_size} over span {total_span}",
            self.total_steps
        );
        stage.move_relative(-self.half_span);
        self.settled_at = Some(Instant::now());
        self.phase = SweepPhase::Sweeping;
        Ok(self.total_steps)
    }

    /// Feed one focus measurement into the sweep.
    ///
    /// Measurements captured before the last settle timestamp minus the
    /// camera exposure, arriving while the stage moves, or arriving after
    /// the table is full are silently discarded; late frames from an
    /// already-advanced stage state are dropped rather than queued.
    pub fn on_measurement(
        &mut self,
        stage: &mut dyn Stage,
        score: f64,
        captured_at: Instant,
        exposure: Duration,
    ) -> MeasurementOutcome {
        match self.phase {
            SweepPhase::Sweeping => {}
            SweepPhase::SweepComplete => {
                return MeasurementOutcome::Rejected(RejectReason::SweepComplete);
            }
            _ => return MeasurementOutcome::Rejected(RejectReason::SweepInactive),
        }

        if stage.is_moving() {
            debug!("[autofocus] measurement rejected: stage moving");
            return MeasurementOutcome::Rejected(RejectReason::StageMoving);
        }

        if let Some(settled) = self.settled_at {
            if captured_at + exposure < settled {
                debug!("[autofocus] measurement rejected: stale capture");
                return MeasurementOutcome::Rejected(RejectReason::Stale);
            }
        }

        let position = stage.position();
        if let Some(sink) = &mut self.sink {
            sink.record_measurement(&MeasurementRow {
                captured_at,
                processed_at: Instant::now(),
                position,
                score,
            });
        }

        self.step_scores.push(score);
        if self.step_scores.len() < self.config.samples_per_step {
            return MeasurementOutcome::Accumulated {
                collected: self.step_scores.len(),
            };
        }

        // The first samples after a move and the last before the next one
        // are the most likely to be contaminated by transition timing.
        let retained = &self.step_scores[LEADING_DISCARD..self.step_scores.len() - TRAILING_DISCARD];
        let (mean, stddev) = mean_and_stddev(retained);

        self.table.push(ZSample {
            position,
            score: mean,
            noise: stddev,
        });
        if let Some(sink) = &mut self.sink {
            sink.record_step(&StepRow {
                position,
                mean_score: mean,
                stddev,
            });
        }
        debug!(
            "[autofocus] step {}/{} at {position:.3}: mean {mean:.3}, stddev {stddev:.3}",
            self.table.len(),
            self.total_steps
        );

        stage.move_relative(self.step_size);
        self.settled_at = Some(Instant::now());
        self.step_scores.clear();

        if self.table.len() >= self.total_steps {
            self.phase = SweepPhase::SweepComplete;
            info!("[autofocus] sweep complete: {} steps collected", self.table.len());
            MeasurementOutcome::SweepComplete
        } else {
            MeasurementOutcome::StepComplete {
                step: self.table.len(),
                of: self.total_steps,
            }
        }
    }

    /// Return the stage to the sweep origin and fit the response curve.
    ///
    /// The return path reverses the outward path move for move rather than
    /// issuing one absolute move. The controller becomes `Ready` regardless
    /// of fit success; a failed fit is reported (and the previous parameters
    /// remain available), not fatal.
    pub fn finish_sweep(&mut self, stage: &mut dyn Stage) -> Result<bool, SweepError> {
        if self.phase != SweepPhase::SweepComplete {
            return Err(SweepError::NotComplete);
        }

        for _ in 0..self.total_steps {
            stage.move_relative(-self.step_size);
        }
        stage.move_relative(self.half_span);
        self.settled_at = Some(Instant::now());

        self.fit_valid = self.fit_table();
        self.phase = SweepPhase::Ready;
        Ok(self.fit_valid)
    }

    fn fit_table(&mut self) -> bool {
        let Some(max) = self.table.max_entry().copied() else {
            warn!("[autofocus] nothing to fit: table is empty");
            return false;
        };

        let min_score = self
            .table
            .samples()
            .iter()
            .map(|s| s.score)
            .fold(f64::INFINITY, f64::min);
        let offset_guess = min_score.max(self.config.min_offset_guess);
        let width_guess = self.config.width_guess_steps * self.step_size;

        let mut seed = vec![max.score, max.position, width_guess];
        if self.config.model == CurveModel::GaussianWithOffset {
            seed.push(offset_guess);
        }
        self.fitter.set_params(&seed);

        let positions = self.table.positions();
        let scores = self.table.scores();
        if !self.fitter.fit(&positions, &scores) {
            warn!("[autofocus] response fit failed; previous parameters retained");
            return false;
        }

        let params = self.fitter.params();
        let amplitude = params[0];
        let offset = params.get(3).copied().unwrap_or(f64::INFINITY);
        if amplitude <= 0.0 || offset <= 0.0 {
            warn!(
                "[autofocus] likely bad fit: amplitude {amplitude:.3}, offset {offset:.3} not positive"
            );
            return false;
        }

        info!(
            "[autofocus] response fitted: amplitude {amplitude:.3}, focus at {:.3}, width {:.3}",
            params[1], params[2]
        );
        true
    }

    /// Maximum aggregated score observed during the sweep.
    pub fn max_focus(&self) -> Option<f64> {
        if self.phase != SweepPhase::Ready {
            return None;
        }
        self.table.max_entry().map(|s| s.score)
    }

    /// Peak of the fitted response curve, when the fit is valid.
    pub fn fitted_max_focus(&self) -> Option<f64> {
        if !self.fit_valid {
            return None;
        }
        Some(self.fitter.evaluate(self.fitter.params()[1]))
    }

    /// Upper threshold score: the configured fraction of the maximum.
    pub fn upper_threshold_focus(&self) -> Option<f64> {
        self.max_focus().map(|max| max * self.config.upper_threshold)
    }

    /// Lower threshold score: the configured fraction of the maximum.
    pub fn lower_threshold_focus(&self) -> Option<f64> {
        self.max_focus().map(|max| max * self.config.lower_threshold)
    }

    /// Noise estimate for the table entry nearest to `score`.
    pub fn noise_near_score(&self, score: f64) -> Option<f64> {
        self.table.noise_near_score(score)
    }

    /// Noise estimate for the table entry nearest to `position`.
    pub fn noise_at_position(&self, position: f64) -> Option<f64> {
        self.table.noise_at_position(position)
    }

    /// Live correction signal: distance from the fitted in-focus position to
    /// the axis position producing `score`, on the above-peak side.
    pub fn correction_distance(&self, score: f64) -> Option<f64> {
        if !self.fit_valid {
            return None;
        }
        let mean = self.fitter.params()[1];
        Some(self.fitter.invert(score) - mean)
    }
}

impl std::fmt::Debug for AutofocusController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutofocusController")
            .field("phase", &self.phase)
            .field("steps", &self.table.len())
            .field("fit_valid", &self.fit_valid)
            .finish()
    }
}

fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / values.len() as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStage {
        position: f64,
        moving: bool,
        moves: Vec<f64>,
    }

    impl MockStage {
        fn new(position: f64) -> Self {
            Self {
                position,
                moving: false,
                moves: Vec::new(),
            }
        }
    }

    impl Stage for MockStage {
        fn position(&self) -> f64 {
            self.position
        }

        fn move_relative(&mut self, delta: f64) {
            self.position += delta;
            self.moves.push(delta);
        }

        fn is_moving(&self) -> bool {
            self.moving
        }
    }

    const EXPOSURE: Duration = Duration::from_millis(10);

    fn feed_step(
        controller: &mut AutofocusController,
        stage: &mut MockStage,
        scores: &[f64],
    ) -> MeasurementOutcome {
        let mut last = MeasurementOutcome::Rejected(RejectReason::SweepInactive);
        for &score in scores {
            last = controller.on_measurement(stage, score, Instant::now(), EXPOSURE);
        }
        last
    }

    #[test]
    fn aggregation_trims_first_two_and_last() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        controller.start_sweep(&mut stage, 1.0, 3.0).unwrap();

        let outcome = feed_step(
            &mut controller,
            &mut stage,
            &[10.0, 11.0, 100.0, 20.0, 21.0, 19.0, 5.0],
        );
        assert_eq!(outcome, MeasurementOutcome::StepComplete { step: 1, of: 3 });
        assert_eq!(controller.table().len(), 1);

        // Retained set is [100, 20, 21, 19].
        let entry = controller.table().samples()[0];
        assert!((entry.score - 40.0).abs() < 1e-9, "mean was {}", entry.score);
        assert!(entry.noise > 0.0);
    }

    #[test]
    fn stale_measurements_are_rejected() {
        let stale_stamp = Instant::now() - Duration::from_secs(1);
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        controller.start_sweep(&mut stage, 1.0, 2.0).unwrap();

        let outcome = controller.on_measurement(&mut stage, 5.0, stale_stamp, EXPOSURE);
        assert_eq!(outcome, MeasurementOutcome::Rejected(RejectReason::Stale));
    }

    #[test]
    fn in_motion_measurements_are_rejected() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        controller.start_sweep(&mut stage, 1.0, 2.0).unwrap();

        stage.moving = true;
        let outcome = controller.on_measurement(&mut stage, 5.0, Instant::now(), EXPOSURE);
        assert_eq!(
            outcome,
            MeasurementOutcome::Rejected(RejectReason::StageMoving)
        );
    }

    #[test]
    fn measurements_without_a_sweep_are_rejected() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        let outcome = controller.on_measurement(&mut stage, 5.0, Instant::now(), EXPOSURE);
        assert_eq!(
            outcome,
            MeasurementOutcome::Rejected(RejectReason::SweepInactive)
        );
    }

    #[test]
    fn sweep_completes_after_requested_steps_and_rejects_extras() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(10.0);
        let steps = controller.start_sweep(&mut stage, 1.0, 2.0).unwrap();
        assert_eq!(steps, 2);

        let scores = [5.0; 7];
        assert_eq!(
            feed_step(&mut controller, &mut stage, &scores),
            MeasurementOutcome::StepComplete { step: 1, of: 2 }
        );
        assert_eq!(
            feed_step(&mut controller, &mut stage, &scores),
            MeasurementOutcome::SweepComplete
        );
        assert_eq!(
            controller.on_measurement(&mut stage, 5.0, Instant::now(), EXPOSURE),
            MeasurementOutcome::Rejected(RejectReason::SweepComplete)
        );
    }

    #[test]
    fn return_path_mirrors_the_outward_path() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(25.0);
        controller.start_sweep(&mut stage, 1.0, 4.0).unwrap();

        let scores = [5.0; 7];
        for _ in 0..4 {
            feed_step(&mut controller, &mut stage, &scores);
        }
        controller.finish_sweep(&mut stage).unwrap();

        // Outward: one edge move + 4 steps. Return: 4 steps + one edge move.
        assert_eq!(stage.moves.len(), 10);
        assert!((stage.position - 25.0).abs() < 1e-9);
        assert!(controller.is_ready());
    }

    #[test]
    fn finish_before_completion_is_an_error() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        controller.start_sweep(&mut stage, 1.0, 4.0).unwrap();
        assert!(matches!(
            controller.finish_sweep(&mut stage),
            Err(SweepError::NotComplete)
        ));
    }

    #[test]
    fn full_sweep_fits_a_synthetic_response() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(10.0);
        controller.start_sweep(&mut stage, 1.0, 10.0).unwrap();

        // Noiseless Gaussian response centered on the starting position.
        let response =
            |p: f64| 50.0 * (-(p - 10.0) * (p - 10.0) / (2.0 * 2.0 * 2.0)).exp() + 1.0;
        loop {
            let score = response(stage.position);
            let outcome = feed_step(&mut controller, &mut stage, &[score; 7]);
            if outcome == MeasurementOutcome::SweepComplete {
                break;
            }
        }

        let fit_ok = controller.finish_sweep(&mut stage).unwrap();
        assert!(fit_ok, "fit failed: {:?}", controller.fitter());
        assert!((stage.position - 10.0).abs() < 1e-9);

        let params = controller.fitter().params();
        assert!((params[0] - 50.0).abs() < 1.0, "amplitude {}", params[0]);
        assert!((params[1] - 10.0).abs() < 0.1, "mean {}", params[1]);
    }

    #[test]
    fn threshold_queries_use_default_fractions() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        controller.table.push(ZSample {
            position: 10.0,
            score: 50.0,
            noise: 1.0,
        });
        controller.phase = SweepPhase::Ready;

        assert_eq!(controller.upper_threshold_focus(), Some(42.5));
        assert_eq!(controller.lower_threshold_focus(), Some(1.0));
    }

    #[test]
    fn correction_distance_is_positive_above_focus() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        controller.fitter.set_params(&[50.0, 10.0, 2.0, 1.0]);
        controller.fit_valid = true;
        controller.phase = SweepPhase::Ready;

        let upper = 0.85 * 51.0;
        let distance = controller.correction_distance(upper).unwrap();
        assert!(distance > 0.0 && distance < 5.0, "distance {distance}");
        // Exactly at the peak the correction vanishes.
        assert!(controller.correction_distance(51.0).unwrap().abs() < 1e-9);
    }

    #[test]
    fn noise_lookup_searches_from_the_peak() {
        let mut table = ZStackTable::default();
        for (position, score, noise) in [
            (1.0, 10.0, 0.1),
            (2.0, 50.0, 0.5),
            (3.0, 30.0, 0.3),
            (4.0, 5.0, 0.05),
        ] {
            table.push(ZSample {
                position,
                score,
                noise,
            });
        }

        assert_eq!(table.max_index(), 1);
        // Searching from the peak toward higher indices: 29 is nearest 30.
        assert_eq!(table.noise_near_score(29.0), Some(0.3));
        assert_eq!(table.noise_at_position(3.9), Some(0.05));
    }

    #[test]
    fn restarting_a_sweep_clears_previous_state() {
        let mut controller = AutofocusController::new(AutofocusConfig::default());
        let mut stage = MockStage::new(0.0);
        controller.start_sweep(&mut stage, 1.0, 2.0).unwrap();
        let scores = [5.0; 7];
        feed_step(&mut controller, &mut stage, &scores);
        feed_step(&mut controller, &mut stage, &scores);
        controller.finish_sweep(&mut stage).unwrap();
        assert!(controller.is_ready());

        controller.start_sweep(&mut stage, 1.0, 2.0).unwrap();
        assert_eq!(controller.table().len(), 0);
        assert_eq!(controller.phase(), SweepPhase::Sweeping);
    }
}
