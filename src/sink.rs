//! Optional persistence of sweep measurements.
//!
//! The autofocus controller functions identically with no sink attached; a
//! sink that fails to open or write degrades to a warning and is never an
//! error for the calibration protocol.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::warn;

/// One raw focus measurement, before per-step aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRow {
    pub captured_at: Instant,
    pub processed_at: Instant,
    pub position: f64,
    pub score: f64,
}

/// One aggregated z-stack step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRow {
    pub position: f64,
    pub mean_score: f64,
    pub stddev: f64,
}

/// Receiver for sweep data rows.
pub trait FocusSink {
    fn record_measurement(&mut self, row: &MeasurementRow);
    fn record_step(&mut self, row: &StepRow);
}

/// CSV sink writing measurements and aggregated steps to two files.
///
/// Timestamps are written as seconds relative to the sink's construction,
/// since the capture clock is monotonic-only.
pub struct CsvFocusSink {
    epoch: Instant,
    measurements: BufWriter<File>,
    steps: BufWriter<File>,
    write_failed: bool,
}

impl CsvFocusSink {
    pub fn create(measurements_path: &Path, steps_path: &Path) -> Result<Self> {
        let mut measurements = BufWriter::new(
            File::create(measurements_path)
                .with_context(|| format!("opening {}", measurements_path.display()))?,
        );
        let mut steps = BufWriter::new(
            File::create(steps_path).with_context(|| format!("opening {}", steps_path.display()))?,
        );
        writeln!(measurements, "captured_s,processed_s,position,score")
            .context("writing measurement header")?;
        writeln!(steps, "position,mean_score,stddev").context("writing step header")?;

        Ok(Self {
            epoch: Instant::now(),
            measurements,
            steps,
            write_failed: false,
        })
    }

    fn note_failure(&mut self, err: std::io::Error) {
        if !self.write_failed {
            warn!("[sink] csv write failed, further rows dropped: {err}");
            self.write_failed = true;
        }
    }
}

impl FocusSink for CsvFocusSink {
    fn record_measurement(&mut self, row: &MeasurementRow) {
        if self.write_failed {
            return;
        }
        let captured = row.captured_at.saturating_duration_since(self.epoch);
        let processed = row.processed_at.saturating_duration_since(self.epoch);
        if let Err(err) = writeln!(
            self.measurements,
            "{:.6},{:.6},{:.4},{:.6}",
            captured.as_secs_f64(),
            processed.as_secs_f64(),
            row.position,
            row.score
        ) {
            self.note_failure(err);
        }
    }

    fn record_step(&mut self, row: &StepRow) {
        if self.write_failed {
            return;
        }
        if let Err(err) = writeln!(
            self.steps,
            "{:.4},{:.6},{:.6}",
            row.position, row.mean_score, row.stddev
        ) {
            self.note_failure(err);
        }
    }
}

impl Drop for CsvFocusSink {
    fn drop(&mut self) {
        let _ = self.measurements.flush();
        let _ = self.steps.flush();
    }
}
