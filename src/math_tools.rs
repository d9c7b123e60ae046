//! Per-pixel statistics over the time axis of a cube.
//!
//! All reductions propagate NaN: a pixel that is NaN in any frame (for
//! example because a rotation left it outside the field) reduces to NaN.

use ndarray::{Array2, ArrayBase, ArrayView1, Axis, Data, Ix3, Zip};
use num_traits::{Float, NumCast};

/// Converts a count into the float type of the data.
fn count<A: Float>(n: usize) -> A {
    <A as NumCast>::from(n).unwrap_or_else(A::nan)
}

/// Arithmetic mean of a pixel's time series. Empty input gives NaN.
pub fn mean<A: Float>(lane: ArrayView1<'_, A>) -> A {
    if lane.is_empty() {
        return A::nan();
    }
    lane.iter().fold(A::zero(), |acc, &v| acc + v) / count(lane.len())
}

/// Median of a pixel's time series.
///
/// Even lengths average the two middle values. Empty input or any NaN gives NaN.
pub fn median<A: Float>(lane: ArrayView1<'_, A>) -> A {
    if lane.is_empty() || lane.iter().any(|v| v.is_nan()) {
        return A::nan();
    }
    let mut values = lane.to_vec();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / count(2)
    } else {
        values[mid]
    }
}

/// Unbiased sample variance (`n - 1` denominator). Fewer than two samples give 0.
pub fn sample_variance<A: Float>(lane: ArrayView1<'_, A>) -> A {
    let n = lane.len();
    if n < 2 {
        return A::zero();
    }
    let mu = mean(lane);
    let sum_sq = lane.iter().fold(A::zero(), |acc, &v| acc + (v - mu) * (v - mu));
    sum_sq / count(n - 1)
}

/// Per-pixel temporal variance of an `(n, H, W)` cube, as an `H x W` frame.
pub fn temporal_variance<A, S>(cube: &ArrayBase<S, Ix3>) -> Array2<A>
where
    S: Data<Elem = A>,
    A: Float + Send + Sync,
{
    Zip::from(cube.lanes(Axis(0))).par_map_collect(|lane| sample_variance(lane))
}
