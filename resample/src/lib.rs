//! # resample
//!
//! Affine resampling of single 2-D frames.
//!
//! Frames are `ndarray` matrices indexed `[row, col]`. Geometry is expressed in
//! `(x, y)` pixel coordinates with `x = col` and `y = row`. Rows grow upward as in
//! FITS display, so a positive rotation angle turns the frame counter-clockwise
//! on the sky.
//!
//! Every destination pixel is produced by mapping its coordinate back into the
//! source frame. Samples whose source coordinate falls outside
//! `[0, W - 1] x [0, H - 1]` receive the caller's `fill` value; nothing is ever
//! clamped onto the border. Rotations sample only the ellipse inscribed in that
//! rectangle, so the frame corners come back as `fill` for any non-zero angle.
//!
//! ## Example
//!
//! ```
//! use ndarray::array;
//! use resample::{rotate_frame, Interpolation};
//!
//! let frame = array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let turned = rotate_frame(frame.view(), 90.0, Interpolation::Bilinear, 0.0);
//! assert_eq!(turned[[1, 0]], 1.0);
//! ```

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use num_traits::{Float, NumCast};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source coordinates this close outside the domain still count as inside.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Interpolation order used when a source coordinate falls between pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Value of the closest source pixel.
    Nearest,
    /// Weighted mean of the four surrounding source pixels.
    #[default]
    Bilinear,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "Nearest"),
            Interpolation::Bilinear => write!(f, "Bilinear"),
        }
    }
}

/// Errors raised by generic warps.
#[derive(Debug, Clone, PartialEq)]
pub enum ResampleError {
    /// The transform cannot be inverted, so destination pixels have no source.
    SingularTransform,
}

impl fmt::Display for ResampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleError::SingularTransform => write!(f, "transform is not invertible"),
        }
    }
}

impl std::error::Error for ResampleError {}

/// A 2-D affine map `p -> M p + b` acting on `(x, y)` pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    matrix: [[f64; 2]; 2],
    offset: [f64; 2],
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        matrix: [[1.0, 0.0], [0.0, 1.0]],
        offset: [0.0, 0.0],
    };

    pub fn new(matrix: [[f64; 2]; 2], offset: [f64; 2]) -> Self {
        Affine { matrix, offset }
    }

    /// Shift by `dx` columns and `dy` rows.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Affine {
            matrix: Self::IDENTITY.matrix,
            offset: [dx, dy],
        }
    }

    /// Counter-clockwise rotation about the coordinate origin.
    ///
    /// Multiples of 90 degrees produce exact `0`/`±1` matrix entries, so quarter
    /// turns permute the pixel lattice without interpolation noise.
    pub fn rotation(angle_deg: f64) -> Self {
        let (sin, cos) = sin_cos_deg(angle_deg);
        Affine {
            matrix: [[cos, -sin], [sin, cos]],
            offset: [0.0, 0.0],
        }
    }

    /// Counter-clockwise rotation about `center = (x, y)`.
    pub fn rotation_about(center: (f64, f64), angle_deg: f64) -> Self {
        let (cx, cy) = center;
        Affine::translation(-cx, -cy)
            .then(&Affine::rotation(angle_deg))
            .then(&Affine::translation(cx, cy))
    }

    /// Composition that applies `self` first and `next` second.
    pub fn then(&self, next: &Affine) -> Affine {
        let a = &next.matrix;
        let b = &self.matrix;
        let matrix = [
            [
                a[0][0] * b[0][0] + a[0][1] * b[1][0],
                a[0][0] * b[0][1] + a[0][1] * b[1][1],
            ],
            [
                a[1][0] * b[0][0] + a[1][1] * b[1][0],
                a[1][0] * b[0][1] + a[1][1] * b[1][1],
            ],
        ];
        let (ox, oy) = next.apply_linear(self.offset[0], self.offset[1]);
        Affine {
            matrix,
            offset: [ox + next.offset[0], oy + next.offset[1]],
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let (lx, ly) = self.apply_linear(x, y);
        (lx + self.offset[0], ly + self.offset[1])
    }

    fn apply_linear(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.matrix;
        (m[0][0] * x + m[0][1] * y, m[1][0] * x + m[1][1] * y)
    }

    /// Returns `None` when the linear part is singular or not finite.
    pub fn inverse(&self) -> Option<Affine> {
        let m = &self.matrix;
        let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let matrix = [
            [m[1][1] / det, -m[0][1] / det],
            [-m[1][0] / det, m[0][0] / det],
        ];
        let linear = Affine {
            matrix,
            offset: [0.0, 0.0],
        };
        let (ox, oy) = linear.apply_linear(self.offset[0], self.offset[1]);
        Some(Affine {
            matrix,
            offset: [-ox, -oy],
        })
    }
}

/// Sine and cosine of an angle in degrees, exact at multiples of 90 degrees.
fn sin_cos_deg(angle_deg: f64) -> (f64, f64) {
    let turns = angle_deg / 90.0;
    let nearest = turns.round();
    if (turns - nearest).abs() < 1e-12 {
        match (nearest as i64).rem_euclid(4) {
            0 => (0.0, 1.0),
            1 => (1.0, 0.0),
            2 => (0.0, -1.0),
            _ => (-1.0, 0.0),
        }
    } else {
        angle_deg.to_radians().sin_cos()
    }
}

/// Center of an axis of `len` pixels in pixel coordinates.
fn axis_center(len: usize) -> f64 {
    (len as f64 - 1.0) / 2.0
}

fn weight<A: Float>(w: f64) -> A {
    <A as NumCast>::from(w).unwrap_or_else(A::zero)
}

fn sample<A: Float>(
    src: &ArrayView2<'_, A>,
    x: f64,
    y: f64,
    interpolation: Interpolation,
    fill: A,
) -> A {
    let (height, width) = src.dim();
    if height == 0 || width == 0 || !x.is_finite() || !y.is_finite() {
        return fill;
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    if x < -EDGE_TOLERANCE
        || y < -EDGE_TOLERANCE
        || x > max_x + EDGE_TOLERANCE
        || y > max_y + EDGE_TOLERANCE
    {
        return fill;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    match interpolation {
        Interpolation::Nearest => src[[y.round() as usize, x.round() as usize]],
        Interpolation::Bilinear => {
            let x0 = x.floor() as usize;
            let y0 = y.floor() as usize;
            let fx = x - x0 as f64;
            let fy = y - y0 as f64;
            let x1 = (x0 + 1).min(width - 1);
            let y1 = (y0 + 1).min(height - 1);

            // zero-weight neighbours are skipped so NaN fill cannot leak in
            let mut acc = A::zero();
            for (row, wy) in [(y0, 1.0 - fy), (y1, fy)] {
                if wy == 0.0 {
                    continue;
                }
                for (col, wx) in [(x0, 1.0 - fx), (x1, fx)] {
                    if wx == 0.0 {
                        continue;
                    }
                    acc = acc + src[[row, col]] * weight::<A>(wx * wy);
                }
            }
            acc
        }
    }
}

fn sample_into<A: Float>(
    src: &ArrayView2<'_, A>,
    dst: &mut ArrayViewMut2<'_, A>,
    dst_to_src: &Affine,
    interpolation: Interpolation,
    fill: A,
) {
    for ((row, col), value) in dst.indexed_iter_mut() {
        let (x, y) = dst_to_src.apply(col as f64, row as f64);
        *value = sample(src, x, y, interpolation, fill);
    }
}

/// Resamples `src` into `dst` under the forward map `transform` (source to
/// destination coordinates).
///
/// # Errors
/// [`ResampleError::SingularTransform`] if `transform` has no inverse.
pub fn warp_into<A: Float>(
    src: ArrayView2<'_, A>,
    mut dst: ArrayViewMut2<'_, A>,
    transform: &Affine,
    interpolation: Interpolation,
    fill: A,
) -> Result<(), ResampleError> {
    let dst_to_src = transform
        .inverse()
        .ok_or(ResampleError::SingularTransform)?;
    sample_into(&src, &mut dst, &dst_to_src, interpolation, fill);
    Ok(())
}

/// Allocating variant of [`warp_into`] with an explicit output shape `(rows, cols)`.
pub fn warp<A: Float>(
    src: ArrayView2<'_, A>,
    transform: &Affine,
    shape: (usize, usize),
    interpolation: Interpolation,
    fill: A,
) -> Result<Array2<A>, ResampleError> {
    let mut out = Array2::from_elem(shape, fill);
    warp_into(src, out.view_mut(), transform, interpolation, fill)?;
    Ok(out)
}

/// Whether `(x, y)` lies in the ellipse inscribed in a `rows x cols` frame of
/// pixel centers, i.e. the part of the field that stays inside the frame
/// whatever the rotation angle.
fn in_rotation_domain(x: f64, y: f64, rows: usize, cols: usize) -> bool {
    let normalized = |v: f64, len: usize| {
        let half = axis_center(len);
        let offset = v - half;
        if half > 0.0 {
            offset / half
        } else if offset.abs() <= EDGE_TOLERANCE {
            0.0
        } else {
            f64::INFINITY
        }
    };
    let u = normalized(x, cols);
    let w = normalized(y, rows);
    u * u + w * w <= 1.0 + EDGE_TOLERANCE
}

/// Rotates `src` counter-clockwise by `angle_deg` about its center and writes
/// the result into `dst`, whose center receives the source center.
///
/// Only source coordinates inside the ellipse inscribed in `src` are sampled;
/// every other destination pixel receives `fill`. Frame corners are therefore
/// uncovered after any non-zero rotation, quarter turns included.
pub fn rotate_into<A: Float>(
    src: ArrayView2<'_, A>,
    mut dst: ArrayViewMut2<'_, A>,
    angle_deg: f64,
    interpolation: Interpolation,
    fill: A,
) {
    let (src_rows, src_cols) = src.dim();
    let (dst_rows, dst_cols) = dst.dim();
    let dst_to_src = Affine::translation(-axis_center(dst_cols), -axis_center(dst_rows))
        .then(&Affine::rotation(-angle_deg))
        .then(&Affine::translation(
            axis_center(src_cols),
            axis_center(src_rows),
        ));
    for ((row, col), value) in dst.indexed_iter_mut() {
        let (x, y) = dst_to_src.apply(col as f64, row as f64);
        *value = if in_rotation_domain(x, y, src_rows, src_cols) {
            sample(&src, x, y, interpolation, fill)
        } else {
            fill
        };
    }
}

/// Rotates a frame about its center, keeping its shape.
pub fn rotate_frame<A: Float>(
    src: ArrayView2<'_, A>,
    angle_deg: f64,
    interpolation: Interpolation,
    fill: A,
) -> Array2<A> {
    let mut out = Array2::from_elem(src.raw_dim(), fill);
    rotate_into(src, out.view_mut(), angle_deg, interpolation, fill);
    out
}

/// Shifts a frame by `dx` columns and `dy` rows, keeping its shape.
pub fn translate_frame<A: Float>(
    src: ArrayView2<'_, A>,
    dx: f64,
    dy: f64,
    interpolation: Interpolation,
    fill: A,
) -> Array2<A> {
    let mut out = Array2::from_elem(src.raw_dim(), fill);
    let dst_to_src = Affine::translation(-dx, -dy);
    sample_into(&src, &mut out.view_mut(), &dst_to_src, interpolation, fill);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn gaussian_frame(size: usize, row: f64, col: f64, sigma: f64) -> Array2<f64> {
        Array2::from_shape_fn((size, size), |(r, c)| {
            let d2 = (r as f64 - row).powi(2) + (c as f64 - col).powi(2);
            (-d2 / (2.0 * sigma * sigma)).exp()
        })
    }

    #[test]
    fn test_quarter_turn_is_counter_clockwise() {
        let mut frame = Array2::<f64>::zeros((3, 3));
        frame[[2, 1]] = 1.0;

        let turned = rotate_frame(frame.view(), 90.0, Interpolation::Bilinear, 0.0);

        for ((r, c), v) in turned.indexed_iter() {
            if (r, c) == (1, 0) {
                assert_eq!(*v, 1.0);
            } else {
                assert_eq!(*v, 0.0, "pixel ({r}, {c}) should be empty");
            }
        }
    }

    #[test]
    fn test_quarter_turn_does_not_leak_nan() {
        let mut frame = Array2::<f64>::ones((4, 4));
        frame[[1, 1]] = f64::NAN;

        let turned = rotate_frame(frame.view(), 90.0, Interpolation::Bilinear, 0.0);

        let nan_count = turned.iter().filter(|v| v.is_nan()).count();
        assert_eq!(nan_count, 1);
        assert!(turned[[1, 2]].is_nan());
        assert_eq!(turned[[2, 1]], 1.0);
    }

    #[test]
    fn test_rotation_fills_corners_outside_inscribed_disc() {
        let frame = Array2::<f64>::ones((3, 3));
        for angle in [90.0, 180.0, -90.0, 30.0] {
            let turned = rotate_frame(frame.view(), angle, Interpolation::Bilinear, f64::NAN);
            for corner in [(0, 0), (0, 2), (2, 0), (2, 2)] {
                assert!(turned[corner].is_nan(), "corner {corner:?} at {angle} deg");
            }
            for edge in [(0, 1), (1, 0), (1, 2), (2, 1), (1, 1)] {
                assert_abs_diff_eq!(turned[edge], 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_rotation_domain_is_inscribed_ellipse() {
        assert!(in_rotation_domain(2.0, 1.0, 3, 5));
        assert!(in_rotation_domain(4.0, 1.0, 3, 5));
        assert!(!in_rotation_domain(4.0, 2.0, 3, 5));
        assert!(in_rotation_domain(0.0, 3.0, 7, 1));
        assert!(!in_rotation_domain(0.5, 3.0, 7, 1));
    }

    #[test]
    fn test_identity_warp_reproduces_frame() {
        let frame = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = warp(
            frame.view(),
            &Affine::IDENTITY,
            frame.dim(),
            Interpolation::Bilinear,
            -1.0,
        )
        .unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_translation_fills_uncovered_column() {
        let frame = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = translate_frame(frame.view(), 1.0, 0.0, Interpolation::Bilinear, -1.0);
        assert_eq!(out, array![[-1.0, 1.0, 2.0], [-1.0, 4.0, 5.0]]);
    }

    #[test]
    fn test_half_pixel_translation_interpolates() {
        let frame = array![[0.0, 2.0, 4.0]];
        let out = translate_frame(frame.view(), 0.5, 0.0, Interpolation::Bilinear, f64::NAN);
        assert!(out[[0, 0]].is_nan());
        assert_abs_diff_eq!(out[[0, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 2]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_picks_closest_pixel() {
        let frame = array![[0.0, 10.0], [20.0, 30.0]];
        let transform = Affine::translation(0.3, 0.0);
        let out = warp(frame.view(), &transform, (2, 2), Interpolation::Nearest, -1.0).unwrap();
        assert_eq!(out, array![[-1.0, 10.0], [-1.0, 30.0]]);
    }

    #[test]
    fn test_rotation_round_trip_recovers_interior() {
        let frame = gaussian_frame(21, 13.0, 7.0, 4.0);
        let there = rotate_frame(frame.view(), 25.0, Interpolation::Bilinear, 0.0);
        let back = rotate_frame(there.view(), -25.0, Interpolation::Bilinear, 0.0);

        for ((r, c), v) in back.indexed_iter() {
            let d = ((r as f64 - 10.0).powi(2) + (c as f64 - 10.0).powi(2)).sqrt();
            if d <= 6.0 {
                assert_abs_diff_eq!(*v, frame[[r, c]], epsilon = 0.06);
            }
        }
    }

    #[test]
    fn test_composition_and_inverse() {
        let forward = Affine::rotation_about((2.0, 3.0), 30.0).then(&Affine::translation(1.5, -2.0));
        let inverse = forward.inverse().unwrap();
        let (x, y) = forward.apply(4.0, -1.0);
        let (bx, by) = inverse.apply(x, y);
        assert_abs_diff_eq!(bx, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(by, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let frame = array![[1.0, 2.0], [3.0, 4.0]];
        let flat = Affine::new([[1.0, 0.0], [0.0, 0.0]], [0.0, 0.0]);
        let result = warp(frame.view(), &flat, (2, 2), Interpolation::Bilinear, 0.0);
        assert_eq!(result, Err(ResampleError::SingularTransform));
    }
}
