//! # adi-cube
//!
//! Masked views and derotate-and-combine for angular differential imaging
//! (ADI) cubes.
//!
//! A cube is an `(n, H, W)` [`ndarray::Array3`] holding `n` frames in time
//! order, each tagged with a field-rotation angle in degrees. The crate provides
//!
//! - [`geometry`]: frame centers, radial bands and their pixel index sets, and
//!   temporal pruning of frames that barely rotated,
//! - [`AnnulusView`] and [`MultiAnnulusView`]: non-copying masked views over a
//!   cube that flatten the selected pixels into dense matrices and scatter
//!   matrices back,
//! - [`derotate`]: per-frame rotation and collapse of the time axis, either with
//!   a plain statistic or with the noise-weighted combination of
//!   Bottom et al. (2017).
//!
//! Rotation follows one convention everywhere: rows grow upward as in FITS
//! display and a positive angle turns a frame counter-clockwise on the sky.
//!
//! ```rust
//! use adi_cube::{collapse_deweighted, DerotateConfig};
//! use ndarray::Array3;
//!
//! let cube = Array3::from_shape_fn((4, 15, 15), |(t, r, c)| (t + r + c) as f64);
//! let angles = [0.0, 12.0, 24.0, 36.0];
//! let frame = collapse_deweighted(&cube, &angles, f64::NAN, &DerotateConfig::default()).unwrap();
//! assert_eq!(frame.dim(), (15, 15));
//! ```

pub mod annulus;
pub mod config;
pub mod cube;
pub mod derotate;
pub mod error;
pub mod geometry;
pub mod math_tools;
pub mod multi_annulus;
pub mod reduction;

pub use annulus::{AnnulusView, AnnulusViewMut, AnnulusViewRef, OwnedAnnulusView};
pub use config::{DerotateConfig, PruneConfig};
pub use cube::{expand, flatten};
pub use derotate::{
    collapse, collapse_deweighted, collapse_with, rotate, rotate_in_place, CollapseMethod,
};
pub use error::{AdiError, Result};
pub use geometry::{BandIndices, Location, PruneOutcome, RadialBand};
pub use multi_annulus::{BandIter, MultiAnnulusView};
pub use reduction::{reduce, FrameReducer, Statistic};
pub use resample::Interpolation;
