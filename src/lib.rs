//! Image-correlation drift tracking and autofocus calibration for motorized
//! microscopes.
//!
//! The crate turns raw grayscale frames into sub-pixel-free positional
//! offsets between frames (frequency-domain cross-correlation) and scalar
//! focus scores (Brenner sharpness plus legacy spectral metrics), and runs
//! the calibration protocol that sweeps the focal axis, fits a response
//! curve to the collected scores, and derives correction distances for live
//! use. Camera, stage, and persistence collaborators are consumed through
//! the narrow traits in [`hw`] and [`sink`].

pub mod autofocus;
pub mod dsp;
pub mod fit;
pub mod hw;
pub mod sink;
pub mod util;

pub use autofocus::{
    AutofocusConfig, AutofocusController, MeasurementOutcome, RejectReason, SweepError, SweepPhase,
    ZSample, ZStackTable,
};
pub use dsp::correlation::{CorrelationConfig, CorrelationEngine, PeakOffset, SpectralScores};
pub use dsp::focus::{FocusConfig, FocusProcessor, FocusSnapshot};
pub use dsp::preprocess::{PreprocessError, SpatialBuffer};
pub use dsp::tracking::{TrackerProcessor, TrackingConfig, TrackingSnapshot};
pub use dsp::window::WindowKind;
pub use dsp::{FrameBlock, FrameProcessor, ProcessorUpdate, Reconfigurable};
pub use fit::{CurveFitter, CurveModel};
pub use hw::{FrameSource, Stage};
pub use sink::{CsvFocusSink, FocusSink, MeasurementRow, StepRow};
