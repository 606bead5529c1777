//! Error types for xtcav-core.

use thiserror::Error;

/// Result type alias for xtcav operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a single shot produces no result.
///
/// A rejected shot carries no partial data; callers drop it from any
/// aggregate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// No signal left after background subtraction or denoising.
    #[error("image empty after background subtraction or denoising")]
    Empty,

    /// Peak pixel at or above the camera saturation level.
    #[error("saturated image: peak {max} >= limit {limit}")]
    Saturated { max: f64, limit: f64 },

    /// Segmentation found a different number of bunches than configured.
    #[error("expected {expected} bunches, segmentation found {found}")]
    BunchCountMismatch { expected: usize, found: usize },

    /// RF phase too far from the calibrated 0/180 degree operating point.
    #[error("RF phase far from 0 or 180 degrees (cos of phase difference {cos_phase_diff:.3})")]
    InvalidCalibration { cos_phase_diff: f64 },

    /// Image shape does not match the ROI it was delivered with.
    #[error("image shape {found:?} does not match ROI shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Recoverable conditions met while processing a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotWarning {
    /// Dark background ROI does not contain the shot ROI; not subtracted.
    IncompatibleRoi,
    /// Bunch with zero intensity; statistics fall back to the ROI midpoint.
    DegenerateBunch { bunch: usize },
}

/// Core error types for reference building and reconstruction.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable profiles or frames were supplied.
    #[error("no profiles or frames to build a reference from")]
    EmptyReference,

    /// Profiles disagree on the number of bunches.
    #[error("bunch count mismatch: expected {expected}, found {found}")]
    BunchCountMismatch { expected: usize, found: usize },

    /// Array dimensions disagree.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Shot rejected by the processing pipeline.
    #[error("shot rejected: {0}")]
    Rejected(#[from] Rejection),
}
