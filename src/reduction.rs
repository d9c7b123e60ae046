//! Reductions that collapse the time axis of a cube into one frame.
//!
//! A reducer only sees one pixel's time series at a time; [`reduce`] applies it
//! independently to every pixel of the cube, in parallel.
//!
//! **Example**:
//! ```rust
//! use adi_cube::reduction::{reduce, Statistic};
//! use ndarray::{Array3, ArrayView1};
//!
//! let cube = Array3::from_shape_fn((3, 2, 2), |(t, _, _)| t as f64);
//! let median = reduce(&cube, &Statistic::Median);
//! assert_eq!(median[[0, 0]], 1.0);
//!
//! // any closure over a pixel's time series is a reducer too
//! let peak = reduce(&cube, &|lane: ArrayView1<'_, f64>| lane.fold(f64::MIN, |a, &b| a.max(b)));
//! assert_eq!(peak[[1, 1]], 2.0);
//! ```

use crate::math_tools;
use ndarray::{Array2, ArrayBase, ArrayView1, Axis, Data, Ix3, Zip};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Maps a pixel's time series to a single value.
///
/// Implemented for [`Statistic`] and for any `Fn(ArrayView1<A>) -> A` closure.
pub trait FrameReducer<A>: Sync {
    fn reduce_lane(&self, lane: ArrayView1<'_, A>) -> A;

    /// Human-readable name, used in log messages.
    fn name(&self) -> String {
        "custom".to_string()
    }
}

/// Built-in per-pixel statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    /// Arithmetic mean over frames.
    #[default]
    Mean,
    /// Median over frames.
    Median,
}

impl Display for Statistic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Statistic::Mean => write!(f, "Mean"),
            Statistic::Median => write!(f, "Median"),
        }
    }
}

impl<A: Float> FrameReducer<A> for Statistic {
    fn reduce_lane(&self, lane: ArrayView1<'_, A>) -> A {
        match self {
            Statistic::Mean => math_tools::mean(lane),
            Statistic::Median => math_tools::median(lane),
        }
    }

    fn name(&self) -> String {
        self.to_string()
    }
}

impl<A, F> FrameReducer<A> for F
where
    F: Fn(ArrayView1<'_, A>) -> A + Sync,
{
    fn reduce_lane(&self, lane: ArrayView1<'_, A>) -> A {
        self(lane)
    }
}

/// Collapses the time axis of an `(n, H, W)` cube with `reducer`, pixel by pixel.
pub fn reduce<A, S, R>(cube: &ArrayBase<S, Ix3>, reducer: &R) -> Array2<A>
where
    S: Data<Elem = A>,
    A: Send + Sync,
    R: FrameReducer<A> + ?Sized,
{
    Zip::from(cube.lanes(Axis(0))).par_map_collect(|lane| reducer.reduce_lane(lane))
}
