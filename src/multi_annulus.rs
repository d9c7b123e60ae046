//! Masked view over a cube restricted to several radial bands at once.
//!
//! Each band keeps its own index set; the per-band matrices are produced on
//! demand, one band at a time, so a caller walking the bands never holds more
//! than one band's worth of data.
//!
//! Element access uses union semantics: a pixel is inside the view if any band
//! contains it. Rings built by [`MultiAnnulusView::new`] are disjoint (a pixel
//! sitting exactly on a shared edge belongs to the inner ring); bands given
//! explicitly through [`MultiAnnulusView::from_radii`] or
//! [`MultiAnnulusView::from_bands`] are used as they are and may overlap.

use crate::annulus::scatter_rows;
use crate::error::{AdiError, Result};
use crate::geometry::{covering_radius, frame_center, BandIndices, RadialBand};
use log::trace;
use ndarray::{Array2, Array3, ArrayBase, Data, DataMut, Ix2, Ix3, OwnedRepr, RawData};
use rayon::prelude::*;
use std::sync::Arc;

/// Slack applied when counting how many rings of a given width fit in a range.
const RING_COUNT_TOLERANCE: f64 = 1e-9;

/// Index sets of all bands plus their union, computed once per view.
#[derive(Debug)]
struct BandSet {
    bands: Vec<BandIndices>,
    union: Array2<bool>,
}

impl BandSet {
    fn build(shape: (usize, usize), bands: &[RadialBand], disjoint: bool) -> Self {
        let mut union = Array2::from_elem(shape, false);
        let mut indices = Vec::with_capacity(bands.len());
        for &band in bands {
            let mut band_indices = BandIndices::compute(shape, band);
            if disjoint {
                band_indices = band_indices.excluding(&union);
            }
            union.zip_mut_with(band_indices.mask(), |u, &m| *u = *u || m);
            trace!(
                "band [{}, {}]: {} pixels",
                band.rmin(),
                band.rmax(),
                band_indices.len()
            );
            indices.push(band_indices);
        }
        BandSet {
            bands: indices,
            union,
        }
    }
}

fn check_width(width: f64) -> Result<()> {
    if !(width > 0.0 && width.is_finite()) {
        return Err(AdiError::invalid_config(format!(
            "band width must be finite and positive, got {width}"
        )));
    }
    Ok(())
}

/// Masked view over a cube of storage `S` restricted to a list of radial bands.
pub struct MultiAnnulusView<S: RawData> {
    cube: ArrayBase<S, Ix3>,
    bands: Arc<BandSet>,
    fill: S::Elem,
}

impl<A, S> MultiAnnulusView<S>
where
    A: Copy,
    S: RawData<Elem = A>,
{
    /// Contiguous rings of width `width` starting at `inner`.
    ///
    /// With `outer = Some(r)` the rings stop at the last one that fits below
    /// `r`; with `None` they continue until every corner of the frame is covered.
    ///
    /// # Errors
    /// [`AdiError::InvalidConfig`] for a non-positive width or for more rings
    /// than the frame has pixels, [`AdiError::InvalidGeometry`] when no ring
    /// fits in `[inner, outer]`.
    pub fn new(
        cube: ArrayBase<S, Ix3>,
        width: f64,
        inner: f64,
        outer: Option<f64>,
        fill: A,
    ) -> Result<Self> {
        check_width(width)?;
        let (_, height, frame_width) = cube.dim();
        let shape = (height, frame_width);
        let count = match outer {
            Some(outer) => ((outer - inner) / width + RING_COUNT_TOLERANCE).floor(),
            None => ((covering_radius(shape, frame_center(shape)) - inner) / width).ceil(),
        };
        if !(count >= 1.0) {
            return Err(AdiError::InvalidGeometry {
                rmin: inner,
                rmax: outer.unwrap_or(inner),
            });
        }
        let max_rings = (height * frame_width).max(1);
        if count > max_rings as f64 {
            return Err(AdiError::invalid_config(format!(
                "{count} rings of width {width} exceed the {max_rings} pixels of the frame"
            )));
        }
        let bands = (0..count as usize)
            .map(|k| {
                let rmin = inner + k as f64 * width;
                RadialBand::new(rmin, rmin + width)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::build(cube, &bands, true, fill))
    }

    /// One band of width `width` centered on each of `radii`.
    ///
    /// # Errors
    /// [`AdiError::InvalidConfig`] for a non-positive width or an empty list,
    /// [`AdiError::InvalidGeometry`] if a band would reach below radius 0.
    pub fn from_radii(cube: ArrayBase<S, Ix3>, radii: &[f64], width: f64, fill: A) -> Result<Self> {
        check_width(width)?;
        let bands = radii
            .iter()
            .map(|&radius| RadialBand::centered(radius, width))
            .collect::<Result<Vec<_>>>()?;
        Self::from_bands(cube, &bands, fill)
    }

    /// Arbitrary band list, kept in the given order.
    ///
    /// # Errors
    /// [`AdiError::InvalidConfig`] for an empty list.
    pub fn from_bands(cube: ArrayBase<S, Ix3>, bands: &[RadialBand], fill: A) -> Result<Self> {
        if bands.is_empty() {
            return Err(AdiError::invalid_config("at least one band is required"));
        }
        Ok(Self::build(cube, bands, false, fill))
    }

    fn build(cube: ArrayBase<S, Ix3>, bands: &[RadialBand], disjoint: bool, fill: A) -> Self {
        let (_, height, width) = cube.dim();
        let bands = BandSet::build((height, width), bands, disjoint);
        MultiAnnulusView {
            cube,
            bands: Arc::new(bands),
            fill,
        }
    }

    /// Number of bands.
    pub fn len(&self) -> usize {
        self.bands.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.bands.is_empty()
    }

    /// Index set of band `i`.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] if `i >= self.len()`.
    pub fn indices(&self, i: usize) -> Result<&BandIndices> {
        self.bands
            .bands
            .get(i)
            .ok_or_else(|| AdiError::out_of_bounds(&[i], &[self.len()]))
    }

    pub fn radial_bands(&self) -> Vec<RadialBand> {
        self.bands.bands.iter().map(BandIndices::band).collect()
    }

    /// First band containing `(row, col)`, if any.
    pub fn band_of(&self, row: usize, col: usize) -> Option<usize> {
        self.bands.bands.iter().position(|b| b.contains(row, col))
    }

    /// Whether any band contains `(row, col)`.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.bands.union.get((row, col)).copied().unwrap_or(false)
    }

    pub fn fill(&self) -> A {
        self.fill
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.cube.dim()
    }

    pub fn cube(&self) -> &ArrayBase<S, Ix3> {
        &self.cube
    }

    pub fn into_inner(self) -> ArrayBase<S, Ix3> {
        self.cube
    }

    pub fn shares_indices_with<T: RawData>(&self, other: &MultiAnnulusView<T>) -> bool {
        Arc::ptr_eq(&self.bands, &other.bands)
    }

    fn all_frames(&self) -> Vec<usize> {
        (0..self.cube.dim().0).collect()
    }

    fn check_bounds(&self, t: usize, row: usize, col: usize) -> Result<()> {
        let (frames, height, width) = self.cube.dim();
        if t >= frames || row >= height || col >= width {
            return Err(AdiError::out_of_bounds(&[t, row, col], &[frames, height, width]));
        }
        Ok(())
    }

    fn check_band_matrix<T: Data>(&self, i: usize, matrix: &ArrayBase<T, Ix2>) -> Result<&BandIndices> {
        let indices = self.indices(i)?;
        let expected = (self.cube.dim().0, indices.len());
        if matrix.dim() != expected {
            return Err(AdiError::shape_mismatch(&[expected.0, expected.1], matrix.shape()));
        }
        Ok(indices)
    }
}

impl<A, S> MultiAnnulusView<S>
where
    A: Copy,
    S: Data<Elem = A>,
{
    /// Value at `(t, row, col)` if any band contains the pixel, else the fill value.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] for coordinates outside the cube.
    pub fn get(&self, t: usize, row: usize, col: usize) -> Result<A> {
        self.check_bounds(t, row, col)?;
        if self.contains(row, col) {
            Ok(self.cube[[t, row, col]])
        } else {
            Ok(self.fill)
        }
    }

    fn flatten_band(&self, indices: &BandIndices) -> Array2<A> {
        let coords = indices.coords();
        Array2::from_shape_fn((self.cube.dim().0, coords.len()), |(t, j)| {
            let (row, col) = coords[j];
            self.cube[[t, row, col]]
        })
    }

    /// Dense `(n, band pixels)` matrix of band `i`.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] if `i >= self.len()`.
    pub fn band(&self, i: usize) -> Result<Array2<A>> {
        Ok(self.flatten_band(self.indices(i)?))
    }

    /// Lazy iterator over the per-band matrices in band order. Each call starts
    /// over from the first band.
    pub fn bands(&self) -> BandIter<'_, S> {
        BandIter {
            view: self,
            next: 0,
            end: self.len(),
        }
    }

    /// Scatters the matrix of band `i` into a new cube filled with the fill value.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] for a bad band index, [`AdiError::ShapeMismatch`]
    /// if `matrix` is not `(n, band pixels)`.
    pub fn inverse_band<T>(&self, i: usize, matrix: &ArrayBase<T, Ix2>) -> Result<Array3<A>>
    where
        T: Data<Elem = A>,
    {
        let indices = self.check_band_matrix(i, matrix)?;
        let mut out = Array3::from_elem(self.cube.raw_dim(), self.fill);
        scatter_rows(&mut out, &self.all_frames(), indices.coords(), matrix);
        Ok(out)
    }

    /// Scatters one matrix per band into a single new cube. Pixels claimed by
    /// several bands take the value of the last band that claims them.
    ///
    /// # Errors
    /// [`AdiError::CountMismatch`] unless there is exactly one matrix per band,
    /// [`AdiError::ShapeMismatch`] for a badly shaped matrix.
    pub fn inverse<T>(&self, matrices: &[ArrayBase<T, Ix2>]) -> Result<Array3<A>>
    where
        T: Data<Elem = A>,
    {
        if matrices.len() != self.len() {
            return Err(AdiError::CountMismatch {
                expected: self.len(),
                actual: matrices.len(),
            });
        }
        let frames = self.all_frames();
        let mut out = Array3::from_elem(self.cube.raw_dim(), self.fill);
        for (i, matrix) in matrices.iter().enumerate() {
            let indices = self.check_band_matrix(i, matrix)?;
            scatter_rows(&mut out, &frames, indices.coords(), matrix);
        }
        Ok(out)
    }

    /// Deep-copies the cube; the band index sets are shared.
    pub fn to_owned(&self) -> MultiAnnulusView<OwnedRepr<A>> {
        MultiAnnulusView {
            cube: self.cube.to_owned(),
            bands: Arc::clone(&self.bands),
            fill: self.fill,
        }
    }
}

impl<A, S> MultiAnnulusView<S>
where
    A: Copy + Send + Sync,
    S: Data<Elem = A> + Sync,
{
    /// Applies `f(i, band_matrix)` to every band in parallel. Results come back
    /// in band order.
    pub fn map_bands<R, F>(&self, f: F) -> Vec<R>
    where
        F: Fn(usize, Array2<A>) -> R + Sync + Send,
        R: Send,
    {
        self.bands
            .bands
            .par_iter()
            .enumerate()
            .map(|(i, indices)| f(i, self.flatten_band(indices)))
            .collect()
    }
}

impl<A, S> MultiAnnulusView<S>
where
    A: Copy,
    S: DataMut<Elem = A>,
{
    /// Writes `value` if any band contains the pixel; otherwise a no-op.
    ///
    /// # Errors
    /// [`AdiError::OutOfBounds`] for coordinates outside the cube.
    pub fn set(&mut self, t: usize, row: usize, col: usize, value: A) -> Result<()> {
        self.check_bounds(t, row, col)?;
        if self.contains(row, col) {
            self.cube[[t, row, col]] = value;
        }
        Ok(())
    }

    /// Writes the matrix of band `i` back into the wrapped cube.
    ///
    /// # Errors
    /// Same as [`inverse_band`](Self::inverse_band).
    pub fn scatter_band<T>(&mut self, i: usize, matrix: &ArrayBase<T, Ix2>) -> Result<()>
    where
        T: Data<Elem = A>,
    {
        self.check_band_matrix(i, matrix)?;
        let bands = Arc::clone(&self.bands);
        let frames = self.all_frames();
        scatter_rows(&mut self.cube, &frames, bands.bands[i].coords(), matrix);
        Ok(())
    }
}

/// Iterator returned by [`MultiAnnulusView::bands`].
pub struct BandIter<'a, S: RawData> {
    view: &'a MultiAnnulusView<S>,
    next: usize,
    end: usize,
}

impl<S: RawData> Clone for BandIter<'_, S> {
    fn clone(&self) -> Self {
        BandIter {
            view: self.view,
            next: self.next,
            end: self.end,
        }
    }
}

impl<A, S> Iterator for BandIter<'_, S>
where
    A: Copy,
    S: Data<Elem = A>,
{
    type Item = Array2<A>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let indices = &self.view.bands.bands[self.next];
        self.next += 1;
        Some(self.view.flatten_band(indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<A, S> DoubleEndedIterator for BandIter<'_, S>
where
    A: Copy,
    S: Data<Elem = A>,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        self.end -= 1;
        Some(self.view.flatten_band(&self.view.bands.bands[self.end]))
    }
}

impl<A, S> ExactSizeIterator for BandIter<'_, S>
where
    A: Copy,
    S: Data<Elem = A>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{band_indices, distance};
    use std::collections::HashSet;

    fn ramp_cube(frames: usize, size: usize) -> Array3<f64> {
        Array3::from_shape_fn((frames, size, size), |(t, r, c)| {
            (t * size * size + r * size + c) as f64
        })
    }

    #[test]
    fn test_rings_partition_the_outer_band() {
        let cube = Array3::<f64>::zeros((1, 25, 25));
        let view = MultiAnnulusView::new(cube.view(), 2.0, 2.0, Some(10.0), 0.0).unwrap();
        assert_eq!(view.len(), 4);
        assert_eq!(
            view.radial_bands().iter().map(|b| b.mid()).collect::<Vec<_>>(),
            vec![3.0, 5.0, 7.0, 9.0]
        );

        let whole = RadialBand::new(2.0, 10.0).unwrap();
        let expected: HashSet<_> = band_indices((25, 25), frame_center((25, 25)), &whole)
            .into_iter()
            .collect();

        let mut union = HashSet::new();
        let mut total = 0;
        for i in 0..view.len() {
            let coords = view.indices(i).unwrap().coords();
            total += coords.len();
            union.extend(coords.iter().copied());
        }
        assert_eq!(union, expected);
        assert_eq!(total, expected.len(), "rings must not overlap");
    }

    #[test]
    fn test_rings_without_outer_cover_every_pixel() {
        let cube = Array3::<f64>::zeros((2, 8, 8));
        let view = MultiAnnulusView::new(cube.view(), 3.0, 0.0, None, 0.0).unwrap();
        let last = view.radial_bands().last().copied().unwrap();
        assert!(last.rmax() >= covering_radius((8, 8), frame_center((8, 8))));
        for row in 0..8 {
            for col in 0..8 {
                assert!(view.contains(row, col));
                assert!(view.band_of(row, col).is_some());
            }
        }
    }

    #[test]
    fn test_invalid_construction() {
        let cube = Array3::<f64>::zeros((1, 9, 9));
        assert!(matches!(
            MultiAnnulusView::new(cube.view(), 0.0, 1.0, Some(4.0), 0.0).err(),
            Some(AdiError::InvalidConfig(_))
        ));
        assert!(matches!(
            MultiAnnulusView::new(cube.view(), 2.0, 4.0, Some(5.0), 0.0).err(),
            Some(AdiError::InvalidGeometry { .. })
        ));
        assert!(matches!(
            MultiAnnulusView::from_radii(cube.view(), &[0.5], 2.0, 0.0).err(),
            Some(AdiError::InvalidGeometry { .. })
        ));
        assert!(MultiAnnulusView::from_bands(cube.view(), &[], 0.0).is_err());
    }

    #[test]
    fn test_rejects_more_rings_than_pixels() {
        let cube = Array3::<f64>::zeros((1, 9, 9));
        for outer in [None, Some(10.0)] {
            assert!(matches!(
                MultiAnnulusView::new(cube.view(), 1e-300, 0.0, outer, 0.0).err(),
                Some(AdiError::InvalidConfig(_))
            ));
        }
        assert!(MultiAnnulusView::new(cube.view(), 0.5, 0.0, None, 0.0).is_ok());
    }

    #[test]
    fn test_band_matrix_and_out_of_range() {
        let cube = ramp_cube(3, 11);
        let view = MultiAnnulusView::from_radii(cube.view(), &[2.0, 4.0], 1.0, 0.0).unwrap();
        let band = view.band(1).unwrap();
        let coords = view.indices(1).unwrap().coords();
        assert_eq!(band.dim(), (3, coords.len()));
        let (row, col) = coords[3];
        assert_eq!(band[[2, 3]], cube[[2, row, col]]);

        assert_eq!(view.band(2).err(), Some(AdiError::out_of_bounds(&[2], &[2])));
        assert!(view.indices(5).is_err());
    }

    #[test]
    fn test_bands_iterator_is_lazy_and_restartable() {
        let cube = ramp_cube(2, 13);
        let view = MultiAnnulusView::new(cube.view(), 1.5, 1.0, Some(5.5), 0.0).unwrap();
        let mut iter = view.bands();
        assert_eq!(iter.len(), 3);

        let first = iter.next().unwrap();
        assert_eq!(first, view.band(0).unwrap());
        assert_eq!(iter.len(), 2);

        let rest: Vec<_> = iter.clone().collect();
        assert_eq!(rest.len(), 2);
        assert_eq!(iter.next_back().unwrap(), view.band(2).unwrap());

        let again: Vec<_> = view.bands().collect();
        assert_eq!(again.len(), 3);
        assert_eq!(again[1], view.band(1).unwrap());
    }

    #[test]
    fn test_inverse_round_trip_over_all_bands() {
        let cube = ramp_cube(2, 15);
        let fill = f64::NAN;
        let view = MultiAnnulusView::new(cube.view(), 2.0, 1.0, Some(7.0), fill).unwrap();
        let matrices: Vec<_> = view.bands().collect();
        let restored = view.inverse(&matrices).unwrap();

        let center = frame_center((15, 15));
        for ((t, row, col), &value) in restored.indexed_iter() {
            let d = distance((row, col), center);
            if (1.0..=7.0).contains(&d) {
                assert_eq!(value, cube[[t, row, col]]);
            } else {
                assert!(value.is_nan());
            }
        }

        let single = view.inverse_band(0, &matrices[0]).unwrap();
        let (row, col) = view.indices(0).unwrap().coords()[0];
        assert_eq!(single[[1, row, col]], cube[[1, row, col]]);
        let (row, col) = view.indices(1).unwrap().coords()[0];
        assert!(single[[1, row, col]].is_nan());
    }

    #[test]
    fn test_inverse_rejects_wrong_count_and_shape() {
        let cube = ramp_cube(2, 11);
        let view = MultiAnnulusView::new(cube.view(), 2.0, 0.0, Some(4.0), 0.0).unwrap();
        let matrices: Vec<_> = view.bands().collect();

        assert_eq!(
            view.inverse(&matrices[..1]).err(),
            Some(AdiError::CountMismatch { expected: 2, actual: 1 })
        );
        let swapped = vec![matrices[1].clone(), matrices[0].clone()];
        assert!(matches!(
            view.inverse(&swapped).err(),
            Some(AdiError::ShapeMismatch { .. })
        ));
        assert!(view.inverse_band(0, &matrices[1]).is_err());
    }

    #[test]
    fn test_overlapping_bands_use_union_semantics() {
        let cube = ramp_cube(1, 11);
        let view = MultiAnnulusView::from_radii(cube.view(), &[2.0, 2.5], 1.0, -1.0).unwrap();
        // distance 2 falls in both [1.5, 2.5] and [2.0, 3.0]
        assert_eq!(view.band_of(5, 7), Some(0));
        assert!(view.indices(1).unwrap().contains(5, 7));
        assert_eq!(view.get(0, 5, 7).unwrap(), cube[[0, 5, 7]]);
        assert_eq!(view.get(0, 5, 5).unwrap(), -1.0);
        assert_eq!(view.band_of(5, 5), None);
        assert!(view.get(1, 0, 0).is_err());
    }

    #[test]
    fn test_set_and_scatter_band_write_through() {
        let mut cube = Array3::<f64>::zeros((2, 9, 9));
        {
            let mut view = MultiAnnulusView::new(cube.view_mut(), 2.0, 1.0, Some(3.0), 0.0).unwrap();
            view.set(0, 4, 4, 7.0).unwrap();
            view.set(0, 4, 6, 7.0).unwrap();
            let ones = Array2::<f64>::ones(view.band(0).unwrap().raw_dim());
            view.scatter_band(0, &ones).unwrap();
            assert!(view.scatter_band(1, &ones).is_err());
        }
        assert_eq!(cube[[0, 4, 4]], 0.0);
        assert_eq!(cube[[0, 4, 6]], 1.0);
        assert_eq!(cube[[1, 4, 7]], 1.0);
        assert_eq!(cube[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_map_bands_keeps_band_order() {
        let cube = ramp_cube(3, 21);
        let view = MultiAnnulusView::new(cube.view(), 1.0, 0.0, Some(9.0), 0.0).unwrap();
        let sizes = view.map_bands(|i, matrix| (i, matrix.ncols()));
        assert_eq!(sizes.len(), 9);
        for (k, &(i, cols)) in sizes.iter().enumerate() {
            assert_eq!(i, k);
            assert_eq!(cols, view.indices(k).unwrap().len());
        }
    }

    #[test]
    fn test_to_owned_shares_band_indices() {
        let cube = ramp_cube(1, 9);
        let view = MultiAnnulusView::new(cube.view(), 2.0, 0.0, Some(4.0), 0.0).unwrap();
        let mut copy = view.to_owned();
        assert!(copy.shares_indices_with(&view));
        copy.set(0, 4, 5, -3.0).unwrap();
        assert_eq!(cube[[0, 4, 5]], 41.0);
        assert_eq!(copy.get(0, 4, 5).unwrap(), -3.0);
    }
}
