//! Demo host: wires a synthetic defocus camera and a simulated stage into
//! the engine, runs one calibration sweep, then a short drift-tracking run.

use anyhow::{Context, Result};
use focustrack::util::telemetry;
use focustrack::{
    AutofocusConfig, AutofocusController, CsvFocusSink, FocusConfig, FocusProcessor, FocusSink,
    FrameBlock, FrameProcessor, FrameSource, MeasurementOutcome, ProcessorUpdate, Stage,
    TrackerProcessor, TrackingConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Axis position the simulated optics are in focus at.
const SIM_FOCUS_POSITION: f64 = 100.0;
const SIM_FRAME_SIZE: usize = 192;
const SIM_EXPOSURE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AppConfig {
    focus: FocusConfig,
    autofocus: AutofocusConfig,
    tracking: TrackingConfig,
    sweep_step: f64,
    sweep_span: f64,
    csv_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            focus: FocusConfig::default(),
            autofocus: AutofocusConfig::default(),
            tracking: TrackingConfig::default(),
            sweep_step: 1.0,
            sweep_span: 12.0,
            csv_dir: None,
        }
    }
}

fn load_config() -> Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))
        }
        None => Ok(AppConfig::default()),
    }
}

struct SimStage {
    position: f64,
}

impl Stage for SimStage {
    fn position(&self) -> f64 {
        self.position
    }

    fn move_relative(&mut self, delta: f64) {
        self.position += delta;
    }

    fn is_moving(&self) -> bool {
        false
    }
}

/// Synthetic specimen: an aperiodic texture whose contrast falls off as a
/// Gaussian of the defocus distance, over a constant noise floor.
struct SimCamera {
    buffer: Vec<u8>,
}

impl SimCamera {
    fn new() -> Self {
        Self {
            buffer: vec![0; SIM_FRAME_SIZE * SIM_FRAME_SIZE],
        }
    }

    fn render(&mut self, defocus: f64, shift_x: usize, shift_y: usize) {
        let contrast = (-(defocus * defocus) / (2.0 * 3.0 * 3.0)).exp() as f32;
        for y in 0..SIM_FRAME_SIZE {
            let sy = (y + shift_y) % SIM_FRAME_SIZE;
            for x in 0..SIM_FRAME_SIZE {
                let sx = (x + shift_x) % SIM_FRAME_SIZE;
                let texture = (hash2(sx as u32, sy as u32) & 0xff) as f32 - 128.0;
                // Fixed-pattern sensor noise, independent of focus, keeps the
                // response curve's floor strictly positive.
                let noise = (hash2(x as u32 ^ 0xdead, y as u32 ^ 0xbeef) & 0xf) as f32 - 7.5;
                let value = 128.0 + contrast * texture * 0.8 + noise;
                self.buffer[y * SIM_FRAME_SIZE + x] = value.clamp(0.0, 255.0) as u8;
            }
        }
    }
}

impl FrameSource for SimCamera {
    fn next_frame(&mut self) -> Option<FrameBlock<'_>> {
        Some(FrameBlock::new(
            &self.buffer,
            SIM_FRAME_SIZE,
            SIM_FRAME_SIZE,
            Instant::now(),
        ))
    }

    fn exposure(&self) -> Duration {
        SIM_EXPOSURE
    }
}

#[inline]
fn hash2(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x9e37_79b9) ^ y.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

fn open_sink(config: &AppConfig) -> Option<Box<dyn FocusSink>> {
    let dir = config.csv_dir.as_ref()?;
    match CsvFocusSink::create(&dir.join("measurements.csv"), &dir.join("steps.csv")) {
        Ok(sink) => Some(Box::new(sink)),
        Err(err) => {
            warn!("[sink] continuing without persistence: {err:#}");
            None
        }
    }
}

fn run_sweep(
    config: &AppConfig,
    camera: &mut SimCamera,
    stage: &mut SimStage,
) -> Result<AutofocusController> {
    let mut focus = FocusProcessor::new(config.focus);
    let mut controller = AutofocusController::new(config.autofocus).with_sink(open_sink(config));

    controller.start_sweep(stage, config.sweep_step, config.sweep_span)?;

    loop {
        camera.render(stage.position() - SIM_FOCUS_POSITION, 0, 0);
        let exposure = camera.exposure();
        let Some(frame) = camera.next_frame() else {
            continue;
        };
        let ProcessorUpdate::Snapshot(snapshot) = focus.process_frame(&frame) else {
            continue;
        };

        let outcome =
            controller.on_measurement(stage, snapshot.brenner, snapshot.captured_at, exposure);
        if outcome == MeasurementOutcome::SweepComplete {
            break;
        }
    }

    let fit_ok = controller.finish_sweep(stage)?;
    info!("sweep finished, fit valid: {fit_ok}");
    if let (Some(upper), Some(lower)) = (
        controller.upper_threshold_focus(),
        controller.lower_threshold_focus(),
    ) {
        info!("thresholds: upper {upper:.3}, lower {lower:.3}");
        if let Some(distance) = controller.correction_distance(upper) {
            info!("correction distance at upper threshold: {distance:.3}");
        }
    }
    Ok(controller)
}

fn run_tracking(config: &AppConfig, camera: &mut SimCamera) {
    let mut tracker = TrackerProcessor::new(config.tracking);

    camera.render(0.0, 0, 0);
    if let Some(frame) = camera.next_frame() {
        tracker.process_frame(&frame);
    }

    for (step, (dx, dy)) in [(0, 0), (1, 0), (2, 1), (4, 2), (6, 3)].into_iter().enumerate() {
        camera.render(0.0, dx, dy);
        let Some(frame) = camera.next_frame() else {
            continue;
        };
        match tracker.process_frame(&frame) {
            ProcessorUpdate::Snapshot(snapshot) => info!(
                "tracking step {step}: drift ({}, {}) px, peak {:.1}",
                snapshot.dx, snapshot.dy, snapshot.peak
            ),
            ProcessorUpdate::None => warn!("tracking step {step}: no snapshot"),
        }
    }
}

fn main() -> Result<()> {
    telemetry::init();
    info!("focustrack starting up");

    let config = load_config()?;
    let mut camera = SimCamera::new();
    let mut stage = SimStage {
        position: SIM_FOCUS_POSITION,
    };

    run_sweep(&config, &mut camera, &mut stage)?;
    run_tracking(&config, &mut camera);
    Ok(())
}
