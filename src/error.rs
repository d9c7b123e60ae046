//! Error types for cube views and the derotate/collapse engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdiError>;

/// Errors surfaced at the boundary of the operation that received bad input.
///
/// The pruning-threshold clamp and the zero-variance fallback of the
/// deweighted collapse are numerical policy, not errors, and never show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdiError {
    /// A radial band does not satisfy `0 <= rmin < rmax`.
    #[error("invalid radial band [{rmin}, {rmax}]: expected 0 <= rmin < rmax")]
    InvalidGeometry { rmin: f64, rmax: f64 },

    /// Angle-vector length differs from the frame count, or a matrix handed to
    /// an inverse/scatter operation has the wrong shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The number of per-band matrices differs from the number of bands.
    #[error("expected {expected} per-band matrices, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// An element access or band selector falls outside the valid range.
    #[error("index {index:?} is outside bounds {bounds:?}")]
    OutOfBounds {
        index: Vec<usize>,
        bounds: Vec<usize>,
    },

    /// A configuration value is out of range (widths, fwhm, worker counts, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dedicated worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl AdiError {
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub fn out_of_bounds(index: &[usize], bounds: &[usize]) -> Self {
        Self::OutOfBounds {
            index: index.to_vec(),
            bounds: bounds.to_vec(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
