//! Derotate/collapse engine.
//!
//! Every operation runs `Input -> Rotated -> Reduced` within a single call and
//! keeps no state between calls. Frames are rotated independently and in
//! parallel; output frame `i` always corresponds to input frame `i`.
//!
//! # Sign convention
//! Frame `i` is rotated counter-clockwise on the sky (rows growing upward, as
//! in FITS display) by `angles[i]` degrees about the frame center. Passing the
//! parallactic angles of a sequence therefore derotates a field that turned
//! clockwise on the detector.

use crate::config::DerotateConfig;
use crate::cube::check_angles;
use crate::error::{AdiError, Result};
use crate::math_tools::temporal_variance;
use crate::reduction::{reduce, FrameReducer, Statistic};
use log::debug;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, Array3, ArrayBase, Axis, CowArray, Data, DataMut, Ix3, Zip};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// How the time axis is collapsed after derotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollapseMethod {
    /// Plain per-pixel statistic of the derotated frames.
    Statistic(Statistic),
    /// Inverse-variance weighted mean (Bottom et al. 2017).
    #[default]
    Deweighted,
}

/// Angles within this distance of zero skip interpolation entirely.
fn is_zero_angle(angle: f64) -> bool {
    angle.abs() <= f64::EPSILON
}

fn all_zero(angles: &[f64]) -> bool {
    angles.iter().all(|&a| is_zero_angle(a))
}

/// Rotates every frame of `cube` into a freshly allocated cube.
fn rotate_frames<A, S>(
    cube: &ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
) -> Array3<A>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
{
    let interpolation = config.interpolation;
    let mut out = Array3::from_elem(cube.raw_dim(), fill);
    (out.axis_iter_mut(Axis(0)), cube.axis_iter(Axis(0)), angles)
        .into_par_iter()
        .for_each(|(mut dst, src, &angle)| {
            if is_zero_angle(angle) {
                dst.assign(&src);
            } else {
                resample::rotate_into(src, dst, angle, interpolation, fill);
            }
        });
    out
}

/// Rotation stage shared by the public entry points; borrows the input when
/// every angle is zero.
fn rotate_cow<'a, A, S>(
    cube: &'a ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
) -> CowArray<'a, A, Ix3>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
{
    if all_zero(angles) {
        debug!("all {} angles are zero, skipping rotation", angles.len());
        return CowArray::from(cube.view());
    }
    CowArray::from(rotate_frames(cube, angles, fill, config))
}

/// Rotates frame `i` of `cube` by `angles[i]` degrees, filling samples that fall
/// outside the original frame with `fill`.
///
/// When every angle is (numerically) zero the input is returned as a borrowed
/// view: no copy, no interpolation pass.
///
/// # Errors
/// [`AdiError::ShapeMismatch`] if `angles.len()` differs from the frame count.
pub fn rotate<'a, A, S>(
    cube: &'a ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
) -> Result<CowArray<'a, A, Ix3>>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
{
    check_angles(cube, angles)?;
    config.install(|| rotate_cow(cube, angles, fill, config))
}

/// In-place variant of [`rotate`]. The cube is exclusively borrowed for the
/// duration of the call.
pub fn rotate_in_place<A, S>(
    cube: &mut ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
) -> Result<()>
where
    S: DataMut<Elem = A>,
    A: Float + Send + Sync,
{
    check_angles(cube, angles)?;
    if all_zero(angles) {
        debug!("all {} angles are zero, skipping rotation", angles.len());
        return Ok(());
    }
    let interpolation = config.interpolation;
    let frames = cube.axis_iter_mut(Axis(0));
    config.install(|| {
        (frames, angles)
            .into_par_iter()
            .for_each(|(mut frame, &angle)| {
                if is_zero_angle(angle) {
                    return;
                }
                let src = frame.to_owned();
                resample::rotate_into(src.view(), frame.view_mut(), angle, interpolation, fill);
            });
    })
}

/// Rotates and reduces: `reduce(rotate(cube, angles, fill), reducer)`.
///
/// # Errors
/// [`AdiError::ShapeMismatch`] if `angles.len()` differs from the frame count.
pub fn collapse<A, S, R>(
    cube: &ArrayBase<S, Ix3>,
    angles: &[f64],
    reducer: &R,
    fill: A,
    config: &DerotateConfig,
) -> Result<Array2<A>>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
    R: FrameReducer<A> + ?Sized,
{
    check_angles(cube, angles)?;
    config.install(|| {
        let rotated = rotate_cow(cube, angles, fill, config);
        reduce(&rotated, reducer)
    })
}

/// Noise-weighted collapse (Bottom et al. 2017).
///
/// 1. Per-pixel temporal variance of the un-rotated cube.
/// 2. If every variance is zero or NaN, falls back to the mean of the rotated
///    cube.
/// 3. Otherwise the variance frame is broadcast to a cube and rotated with the
///    same angles and fill as the data.
/// 4. Each pixel becomes `sum(data / var) / sum(1 / var)`; NaN results (pixels
///    no rotated frame covers) are replaced by `fill`.
///
/// Every stage runs on the pool selected by `config`.
///
/// # Errors
/// [`AdiError::ShapeMismatch`] if `angles.len()` differs from the frame count.
pub fn collapse_deweighted<A, S>(
    cube: &ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
) -> Result<Array2<A>>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
{
    deweighted_with(cube, angles, fill, config, &temporal_variance::<A, S>)
}

/// [`collapse_deweighted`] with the variance estimator passed in.
fn deweighted_with<A, S, V>(
    cube: &ArrayBase<S, Ix3>,
    angles: &[f64],
    fill: A,
    config: &DerotateConfig,
    estimate_variance: &V,
) -> Result<Array2<A>>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
    V: Fn(&ArrayBase<S, Ix3>) -> Array2<A> + Sync,
{
    check_angles(cube, angles)?;
    config.install(|| -> Result<Array2<A>> {
        let variance = estimate_variance(cube);
        if variance.iter().all(|v| v.is_nan() || v.abs() <= A::epsilon()) {
            debug!("temporal variance is zero or NaN everywhere, collapsing with the mean");
            let rotated = rotate_cow(cube, angles, fill, config);
            return Ok(reduce(&rotated, &Statistic::Mean));
        }
        let variance_cube = variance
            .broadcast(cube.raw_dim())
            .ok_or_else(|| AdiError::shape_mismatch(cube.shape(), variance.shape()))?;

        let data = rotate_cow(cube, angles, fill, config);
        let weights = rotate_cow(&variance_cube, angles, fill, config);
        Ok(Zip::from(data.lanes(Axis(0)))
            .and(weights.lanes(Axis(0)))
            .par_map_collect(|values, variances| {
                let mut numerator = A::zero();
                let mut denominator = A::zero();
                for (&value, &var) in values.iter().zip(variances.iter()) {
                    numerator = numerator + value / var;
                    denominator = denominator + var.recip();
                }
                let weighted = numerator / denominator;
                if weighted.is_nan() {
                    fill
                } else {
                    weighted
                }
            }))
    })?
}

/// Dispatches to [`collapse`] or [`collapse_deweighted`].
pub fn collapse_with<A, S>(
    cube: &ArrayBase<S, Ix3>,
    angles: &[f64],
    method: CollapseMethod,
    fill: A,
    config: &DerotateConfig,
) -> Result<Array2<A>>
where
    S: Data<Elem = A> + Sync,
    A: Float + Send + Sync,
{
    match method {
        CollapseMethod::Statistic(statistic) => collapse(cube, angles, &statistic, fill, config),
        CollapseMethod::Deweighted => collapse_deweighted(cube, angles, fill, config),
    }
}
