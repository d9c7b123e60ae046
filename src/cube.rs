//! Cube-level helpers shared by the views and the collapse engine.
//!
//! A cube is an `(n, H, W)` array: time first, then rows and columns.
//! [`flatten`] and [`expand`] convert between a cube and the dense `(n, H * W)`
//! matrix consumed by decomposition routines (PCA, NMF, ...).

use crate::error::{AdiError, Result};
use ndarray::{Array2, Array3, ArrayBase, Data, Ix2, Ix3, RawData};

/// Checks that `angles` holds exactly one entry per frame of `cube`.
///
/// # Errors
/// [`AdiError::ShapeMismatch`] with the frame count as the expected shape.
pub fn check_angles<S: RawData>(cube: &ArrayBase<S, Ix3>, angles: &[f64]) -> Result<()> {
    let frames = cube.shape()[0];
    if angles.len() != frames {
        return Err(AdiError::shape_mismatch(&[frames], &[angles.len()]));
    }
    Ok(())
}

/// Unrolls every frame into one row of a dense `(n, H * W)` matrix (row-major
/// pixel order).
pub fn flatten<A, S>(cube: &ArrayBase<S, Ix3>) -> Array2<A>
where
    S: Data<Elem = A>,
    A: Clone,
{
    let (frames, height, width) = cube.dim();
    Array2::from_shape_fn((frames, height * width), |(t, k)| {
        cube[[t, k / width, k % width]].clone()
    })
}

/// Inverse of [`flatten`]: folds each row of `matrix` back into an `H x W` frame.
///
/// # Errors
/// [`AdiError::ShapeMismatch`] if `matrix` does not have `H * W` columns.
pub fn expand<A, S>(matrix: &ArrayBase<S, Ix2>, shape: (usize, usize)) -> Result<Array3<A>>
where
    S: Data<Elem = A>,
    A: Clone,
{
    let (frames, pixels) = matrix.dim();
    let (height, width) = shape;
    if pixels != height * width {
        return Err(AdiError::shape_mismatch(
            &[frames, height * width],
            &[frames, pixels],
        ));
    }
    Ok(Array3::from_shape_fn((frames, height, width), |(t, r, c)| {
        matrix[[t, r * width + c]].clone()
    }))
}
