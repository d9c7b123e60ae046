//! Geometry index engine: frame centers, radial bands and the pixel index sets
//! they select, plus the temporal pruning used by annulus views.
//!
//! Coordinates are `(row, col)` pairs in array order. The frame center of an
//! `H x W` frame is `((H - 1) / 2, (W - 1) / 2)`: a single pixel sits exactly on
//! the center for odd sizes, and the center falls between pixels for even sizes.

use crate::error::{AdiError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A spatial pixel coordinate `(row, col)`.
pub type Coord = (usize, usize);

/// Center `(row, col)` of a frame with shape `(height, width)`.
pub fn frame_center(shape: (usize, usize)) -> (f64, f64) {
    let (height, width) = shape;
    ((height as f64 - 1.0) / 2.0, (width as f64 - 1.0) / 2.0)
}

/// Euclidean distance of `coord` from `center`.
pub fn distance(coord: Coord, center: (f64, f64)) -> f64 {
    let dr = coord.0 as f64 - center.0;
    let dc = coord.1 as f64 - center.1;
    dr.hypot(dc)
}

/// Radius that reaches the farthest pixel of the frame from `center`.
pub fn covering_radius(shape: (usize, usize), center: (f64, f64)) -> f64 {
    let (height, width) = shape;
    if height == 0 || width == 0 {
        return 0.0;
    }
    [(0, 0), (0, width - 1), (height - 1, 0), (height - 1, width - 1)]
        .into_iter()
        .map(|corner| distance(corner, center))
        .fold(0.0, f64::max)
}

/// A closed radial interval `[rmin, rmax]` with `0 <= rmin < rmax`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadialBand {
    rmin: f64,
    rmax: f64,
}

impl RadialBand {
    /// # Errors
    /// [`AdiError::InvalidGeometry`] unless `0 <= rmin < rmax` (NaN bounds included).
    pub fn new(rmin: f64, rmax: f64) -> Result<Self> {
        if !(0.0 <= rmin && rmin < rmax) {
            return Err(AdiError::InvalidGeometry { rmin, rmax });
        }
        Ok(RadialBand { rmin, rmax })
    }

    /// Band of total width `width` centered on `radius`.
    pub fn centered(radius: f64, width: f64) -> Result<Self> {
        Self::new(radius - width / 2.0, radius + width / 2.0)
    }

    pub fn rmin(&self) -> f64 {
        self.rmin
    }

    pub fn rmax(&self) -> f64 {
        self.rmax
    }

    pub fn mid(&self) -> f64 {
        (self.rmin + self.rmax) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.rmax - self.rmin
    }

    /// Inclusive on both ends.
    pub fn contains(&self, distance: f64) -> bool {
        self.rmin <= distance && distance <= self.rmax
    }
}

/// All coordinates of a `shape` frame whose distance to `center` lies in `band`,
/// in row-major order.
///
/// This is O(H * W); callers that access the set repeatedly should keep the
/// result (see [`BandIndices`]).
pub fn band_indices(shape: (usize, usize), center: (f64, f64), band: &RadialBand) -> Vec<Coord> {
    let (height, width) = shape;
    let mut coords = Vec::new();
    for row in 0..height {
        for col in 0..width {
            if band.contains(distance((row, col), center)) {
                coords.push((row, col));
            }
        }
    }
    coords
}

/// The index set of one band, computed once for a frame shape.
///
/// Holds both the ordered coordinate list, which fixes the column order of
/// flattened matrices, and a membership mask for O(1) lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct BandIndices {
    band: RadialBand,
    coords: Vec<Coord>,
    mask: Array2<bool>,
}

impl BandIndices {
    /// Computes the index set of `band` around the center of a `shape` frame.
    pub fn compute(shape: (usize, usize), band: RadialBand) -> Self {
        let coords = band_indices(shape, frame_center(shape), &band);
        let mut mask = Array2::from_elem(shape, false);
        for &(row, col) in &coords {
            mask[[row, col]] = true;
        }
        BandIndices { band, coords, mask }
    }

    pub fn band(&self) -> RadialBand {
        self.band
    }

    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// `false` for coordinates outside the frame.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.mask.get((row, col)).copied().unwrap_or(false)
    }

    /// Drops every pixel already set in `claimed` (same shape as the frame).
    pub(crate) fn excluding(mut self, claimed: &Array2<bool>) -> Self {
        self.coords.retain(|&(row, col)| !claimed[[row, col]]);
        self.mask.zip_mut_with(claimed, |m, &c| *m = *m && !c);
        self
    }
}

/// A position on a frame, given either in absolute pixel coordinates or in
/// polar coordinates around the frame center.
///
/// `x` is the column axis and `y` the row axis. Polar `theta` is in degrees,
/// counter-clockwise from the `+x` axis, the same sense as a positive rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Location {
    Cartesian { x: f64, y: f64 },
    Polar { r: f64, theta: f64 },
}

impl Location {
    /// Absolute `(x, y)` pixel coordinates for a frame centered at
    /// `center = (row, col)`.
    pub fn resolve(&self, center: (f64, f64)) -> (f64, f64) {
        match *self {
            Location::Cartesian { x, y } => (x, y),
            Location::Polar { r, theta } => {
                let (sin, cos) = theta.to_radians().sin_cos();
                (center.1 + r * cos, center.0 + r * sin)
            }
        }
    }
}

/// Minimum parallactic-angle step, in degrees, that moves a source at `radius`
/// by `threshold * fwhm` pixels.
pub fn pa_threshold(threshold: f64, fwhm: f64, radius: f64) -> f64 {
    (2.0 * (threshold * fwhm / (2.0 * radius)).atan()).to_degrees()
}

/// Advisory raised when the requested pruning threshold was larger than 90% of
/// the angular range of the sequence and had to be reduced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdClamp {
    pub requested: f64,
    pub applied: f64,
    pub angular_range: f64,
}

/// Result of [`prune_frames`].
#[derive(Clone, Debug, PartialEq)]
pub struct PruneOutcome {
    /// Kept frame indices in increasing order.
    pub kept: Vec<usize>,
    /// Threshold actually used, in degrees.
    pub threshold: f64,
    pub clamp: Option<ThresholdClamp>,
}

/// Selects the frames to keep so that consecutive kept frames are at least
/// `threshold_deg` apart in angle.
///
/// The first frame is always kept. Frame `i` is kept iff
/// `|angles[i] - angles[last_kept]| >= threshold`; order is never changed.
/// Thresholds above 90% of the angular range are clamped to that value and
/// reported through [`PruneOutcome::clamp`].
pub fn prune_frames(angles: &[f64], threshold_deg: f64) -> PruneOutcome {
    if angles.is_empty() {
        return PruneOutcome {
            kept: Vec::new(),
            threshold: threshold_deg,
            clamp: None,
        };
    }

    let lo = angles.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = angles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let angular_range = hi - lo;
    let ceiling = 0.9 * angular_range;

    let mut threshold = threshold_deg;
    let mut clamp = None;
    if threshold > ceiling {
        log::warn!(
            "pruning threshold {threshold_deg:.3} deg exceeds 90% of the angular range \
             ({angular_range:.3} deg), using {ceiling:.3} deg instead"
        );
        clamp = Some(ThresholdClamp {
            requested: threshold_deg,
            applied: ceiling,
            angular_range,
        });
        threshold = ceiling;
    }

    let mut kept = vec![0];
    let mut last = angles[0];
    for (i, &angle) in angles.iter().enumerate().skip(1) {
        if (angle - last).abs() >= threshold {
            kept.push(i);
            last = angle;
        }
    }

    PruneOutcome {
        kept,
        threshold,
        clamp,
    }
}
