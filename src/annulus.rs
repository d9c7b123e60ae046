//! Masked view over a cube restricted to one radial band.
//!
//! The view never copies the cube it wraps: it holds whatever storage it was
//! built from (a borrowed view, a mutable view or an owned array) plus the
//! band's index set, computed once at construction. Reads outside the band
//! return the fill value and writes outside the band are silently dropped.
//!
//! **Example**:
//! ```rust
//! use adi_cube::annulus::AnnulusView;
//! use ndarray::Array3;
//!
//! let mut cube = Array3::<f64>::ones((4, 9, 9));
//! let mut view = AnnulusView::new(cube.view_mut(), 2.0, 3.0, f64::NAN).unwrap();
//!
//! let mut flat = view.flatten();
//! flat.mapv_inplace(|v| v * 2.0);
//! view.scatter(&flat).unwrap();
//!
//! assert_eq!(cube[[0, 4, 6]], 2.0); // in the band
//! assert_eq!(cube[[0, 4, 4]], 1.0); // center, untouched
//! ```

use crate::config::{DerotateConfig, PruneConfig};
use crate::cube::check_angles;
use crate::derotate;
use crate::error::{AdiError, Result};
use crate::geometry::{pa_threshold, prune_frames, BandIndices, PruneOutcome, RadialBand};
use crate::reduction::FrameReducer;
use log::trace;
use ndarray::{
    Array2, Array3, ArrayBase, Data, DataMut, Ix2, Ix3, OwnedRepr, RawData, ViewRepr,
};
use num_traits::Float;
use std::sync::Arc;

/// Masked view over a cube of storage `S` restricted to one radial band.
pub struct AnnulusView<S: RawData> {
    cube: ArrayBase<S, Ix3>,
    indices: Arc<BandIndices>,
    frames: Vec<usize>,
    fill: S::Elem,
    pruning: Option<PruneOutcome>,
}

/// Read-only annulus over a borrowed cube.
pub type AnnulusViewRef<'a, A> = AnnulusView<ViewRepr<&'a A>>;
/// Annulus whose writes pass through to a mutably borrowed cube.
pub type AnnulusViewMut<'a, A> = AnnulusView<ViewRepr<&'a mut A>>;
/// Annulus that owns its cube, e.g. the result of [`AnnulusView::to_owned`].
pub type OwnedAnnulusView<A> = AnnulusView<OwnedRepr<A>>;

impl<A, S> AnnulusView<S>
where
    A: Copy,
    S: RawData<Elem = A>,
{
    /// Wraps `cube` and keeps every frame.
    ///
    /// # Errors
    /// [`AdiError::InvalidGeometry`] unless `0 <= inner < outer`.
    pub fn new(cube: ArrayBase<S, Ix3>, inner: f64, outer: f64, fill: A) -> Result<Self> {
        let band = RadialBand::new(inner, outer)?;
        let (frames, height, width) = cube.dim();
        let indices = BandIndices::compute((height, width), band);
        trace!(
            "annulus [{inner}, {outer}] on {height}x{width}: {} pixels, {frames} frames",
            indices.len()
        );
        Ok(AnnulusView {
            cube,
            indices: Arc::new(indices),
            frames: (0..frames).collect(),
            fill,
            pruning: None,
        })
    }

    /// Wraps `cube` and drops frames whose rotation relative to the previously
    /// kept frame is below the threshold derived from `prune`.
    ///
    /// The minimum angular step is [`pa_threshold`] evaluated at `prune.radius`,
    /// or at the band's mid radius when no radius is given.
    ///
    /// # Errors
    /// [`AdiError::InvalidGeometry`] for a bad band, [`AdiError::ShapeMismatch`]
    /// if `angles` does not hold one angle per frame, [`AdiError::InvalidConfig`]
    /// for a bad `prune`.
    pub fn with_pruning(
        cube: ArrayBase<S, Ix3>,
        angles: &[f64],
        inner: f64,
        outer: f64,
        fill: A,
        prune: &PruneConfig,
    ) -> Result<Self> {
        check_angles(&cube, angles)?;
        prune.validate()?;
        let mut view = Self::new(cube, inner, outer, fill)?;
        let radius = prune.radius.unwrap_or_else(|| view.band().mid());
        let outcome = prune_frames(angles, pa_threshold(prune.threshold, prune.fwhm, radius));
        trace!(
            "pruning kept {} of {} frames at {:.3} deg",
            outcome.kept.len(),
            angles.len(),
            outcome.threshold
        );
        view.frames = outcome.kept.clone();
        view.pruning = Some(outcome);
        Ok(view)
    }

    pub fn band(&self) -> RadialBand {
        self.indices.band()
    }

    pub fn indices(&self) -> &BandIndices {
        &self.indices
    }

    /// Frame indices that take part in flatten/inverse/collapse, in time order.
    pub fn kept_frames(&self) -> &[usize] {
        &self.frames
    }

    /// Outcome of temporal pruning, if the view was built with angles.
    pub fn pruning(&self) -> Option<&PruneOutcome> {
        self.pruning.as_ref()
    }

    pub fn fill(&self) -> A {
        self.fill
    }

    /// Shape `(n, H, W)` of the wrapped cube.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.cube.dim()
    }

    /// Shape `(kept frames, band pixels)` of [`flatten`](Self::flatten) output.
    pub fn matrix_shape(&self) -> (usize, usize) {
        (self.frames.len(), self.indices.len())
    }

    pub fn cube(&self) -> &ArrayBase<S, Ix3> {
        &self.cube
    }

    pub fn into_inner(self) -> ArrayBase<S, Ix3> {
        self.cube
    }

    /// Whether both views use the same cached index set.
    pub fn shares_indices_with<T: RawData>(&self, other: &AnnulusView<T>) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices)
    }

    /// Selects the angles of the kept frames.
    ///
    /// # Errors
    /// [`AdiError::ShapeMismatch`] if `angles` does not hold one angle per frame.
    pub fn kept_angles(&self, angles: &[f64]) -> Result<Vec<f64>> {
        check_angles(&self.cube, angles)?;
        Ok(self.frames.iter().map(|&t| angles[t]).collect())
    }

    fn check_bounds(&self, t: usize, row: usize, col: usize) -> Result<()> {
        let (frames, height, width) = self.cube.dim();
        if t >= frames || row >= height || col >= width {
            return Err(AdiError::out_of_bounds(&[t, row, col], &[frames, height, width]));
        }
        Ok(())
    }

    fn check_matrix<T: Data>(&self, matrix: &ArrayBase<T, Ix2>) -> Result<()> {
        let (rows, cols) = self.matrix_shape();
        if matrix.dim() != (rows, cols) {
            return Err(AdiError::shape_mismatch(&[rows, cols], matrix.shape()));
        }
        Ok(())
    }
}

impl<A, S> AnnulusView<S>
where
    A: Copy,
    S: Data<Elem = A>,
{
    /// Value at `(t, row, col)`, or the fill value outside the band.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] for coordinates outside the cube.
    pub fn get(&self, t: usize, row: usize, col: usize) -> Result<A> {
        self.check_bounds(t, row, col)?;
        if self.indices.contains(row, col) {
            Ok(self.cube[[t, row, col]])
        } else {
            Ok(self.fill)
        }
    }

    /// Copies the band pixels of the kept frames into a dense
    /// `(kept frames, band pixels)` matrix. Column `j` is `indices().coords()[j]`.
    pub fn flatten(&self) -> Array2<A> {
        let coords = self.indices.coords();
        Array2::from_shape_fn(self.matrix_shape(), |(i, j)| {
            let (row, col) = coords[j];
            self.cube[[self.frames[i], row, col]]
        })
    }

    /// Scatters a matrix shaped like [`flatten`](Self::flatten) output into a
    /// new cube of the view's shape; every other entry is the fill value.
    ///
    /// # Errors
    /// [`AdiError::ShapeMismatch`] if `matrix` is not `(kept frames, band pixels)`.
    pub fn inverse<T>(&self, matrix: &ArrayBase<T, Ix2>) -> Result<Array3<A>>
    where
        T: Data<Elem = A>,
    {
        self.check_matrix(matrix)?;
        let mut out = Array3::from_elem(self.cube.raw_dim(), self.fill);
        scatter_rows(&mut out, &self.frames, self.indices.coords(), matrix);
        Ok(out)
    }

    /// The kept frames with every pixel outside the band set to the fill value.
    pub fn masked_cube(&self) -> Array3<A> {
        let (_, height, width) = self.cube.dim();
        Array3::from_shape_fn((self.frames.len(), height, width), |(i, row, col)| {
            if self.indices.contains(row, col) {
                self.cube[[self.frames[i], row, col]]
            } else {
                self.fill
            }
        })
    }

    /// Read-only view sharing this view's index set.
    pub fn view(&self) -> AnnulusViewRef<'_, A> {
        AnnulusView {
            cube: self.cube.view(),
            indices: Arc::clone(&self.indices),
            frames: self.frames.clone(),
            fill: self.fill,
            pruning: self.pruning.clone(),
        }
    }

    /// Deep-copies the cube; the index set is shared, not recomputed.
    pub fn to_owned(&self) -> OwnedAnnulusView<A> {
        AnnulusView {
            cube: self.cube.to_owned(),
            indices: Arc::clone(&self.indices),
            frames: self.frames.clone(),
            fill: self.fill,
            pruning: self.pruning.clone(),
        }
    }
}

impl<A, S> AnnulusView<S>
where
    A: Float + Send + Sync,
    S: Data<Elem = A>,
{
    /// Derotates the kept frames of the masked cube by their angles and reduces
    /// them with `reducer`. Pixels outside the band enter as the fill value.
    ///
    /// # Errors
    /// [`AdiError::ShapeMismatch`] if `angles` does not hold one angle per frame.
    pub fn collapse<R>(&self, angles: &[f64], reducer: &R, config: &DerotateConfig) -> Result<Array2<A>>
    where
        R: FrameReducer<A> + ?Sized,
    {
        let angles = self.kept_angles(angles)?;
        derotate::collapse(&self.masked_cube(), &angles, reducer, self.fill, config)
    }

    /// Noise-weighted collapse of the kept frames of the masked cube.
    ///
    /// # Errors
    /// [`AdiError::ShapeMismatch`] if `angles` does not hold one angle per frame.
    pub fn collapse_deweighted(&self, angles: &[f64], config: &DerotateConfig) -> Result<Array2<A>> {
        let angles = self.kept_angles(angles)?;
        derotate::collapse_deweighted(&self.masked_cube(), &angles, self.fill, config)
    }
}

impl<A, S> AnnulusView<S>
where
    A: Copy,
    S: DataMut<Elem = A>,
{
    /// Writes `value` at `(t, row, col)` if the pixel is in the band; a write
    /// outside the band is a no-op.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] for coordinates outside the cube.
    pub fn set(&mut self, t: usize, row: usize, col: usize, value: A) -> Result<()> {
        self.check_bounds(t, row, col)?;
        if self.indices.contains(row, col) {
            self.cube[[t, row, col]] = value;
        }
        Ok(())
    }

    /// Like [`inverse`](Self::inverse) but writes into the wrapped cube. Pixels
    /// outside the band and frames that were pruned away are left untouched.
    ///
    /// # Errors
    /// [`AdiError::ShapeMismatch`] if `matrix` is not `(kept frames, band pixels)`.
    pub fn scatter<T>(&mut self, matrix: &ArrayBase<T, Ix2>) -> Result<()>
    where
        T: Data<Elem = A>,
    {
        self.check_matrix(matrix)?;
        scatter_rows(&mut self.cube, &self.frames, self.indices.coords(), matrix);
        Ok(())
    }
}

/// Writes row `i` of `matrix` into frame `frames[i]` of `cube` at `coords`.
pub(crate) fn scatter_rows<A, S, T>(
    cube: &mut ArrayBase<S, Ix3>,
    frames: &[usize],
    coords: &[(usize, usize)],
    matrix: &ArrayBase<T, Ix2>,
) where
    A: Copy,
    S: DataMut<Elem = A>,
    T: Data<Elem = A>,
{
    for (row_values, &t) in matrix.outer_iter().zip(frames) {
        for (&value, &(row, col)) in row_values.iter().zip(coords) {
            cube[[t, row, col]] = value;
        }
    }
}
