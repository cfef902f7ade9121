//! Utility functions and types for focustrack.

pub mod telemetry;
