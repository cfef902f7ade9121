//! Narrow interfaces to the hardware collaborators.
//!
//! The engine consumes frames and stage motion through these traits and
//! never talks to drivers directly. Axis units are consistent real-world
//! distances (microns in practice) treated as opaque scalars; timestamps are
//! monotonic [`std::time::Instant`] values used only for relative comparison.

use crate::dsp::FrameBlock;
use std::time::Duration;

/// Pull-based frame supplier.
pub trait FrameSource {
    /// Next available frame, or `None` when no frame is ready.
    ///
    /// The returned block borrows the source's internal buffer and is valid
    /// until the next call.
    fn next_frame(&mut self) -> Option<FrameBlock<'_>>;

    /// Exposure duration of the camera, used for stale-frame rejection.
    fn exposure(&self) -> Duration;
}

/// Motorized focal/stage axis.
///
/// `move_relative` blocks until the hardware confirms motion completion; the
/// sweep protocol relies on that (a calibration-time simplification, not the
/// live tracking hot path).
pub trait Stage {
    /// Current absolute axis position.
    fn position(&self) -> f64;

    /// Relative move, blocking until motion completes.
    fn move_relative(&mut self, delta: f64);

    /// Whether the axis currently reports motion.
    fn is_moving(&self) -> bool;
}
