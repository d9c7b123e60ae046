//! Runtime configuration for derotation and temporal pruning.

use crate::error::{AdiError, Result};
use resample::Interpolation;
use serde::{Deserialize, Serialize};

/// Settings shared by every rotate/collapse call.
///
/// # Fields
/// - `interpolation`: resampling order used for each frame rotation.
/// - `max_workers`: size of a dedicated worker pool. `None` runs on the global
///   rayon pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerotateConfig {
    pub interpolation: Interpolation,
    pub max_workers: Option<usize>,
}

impl Default for DerotateConfig {
    fn default() -> Self {
        DerotateConfig {
            interpolation: Interpolation::Bilinear,
            max_workers: None,
        }
    }
}

impl DerotateConfig {
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Runs `op` on the configured pool.
    ///
    /// A pool is built per call when `max_workers` is set; otherwise `op` runs
    /// directly and uses the global pool for any parallel work it spawns.
    pub(crate) fn install<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match self.max_workers {
            None => Ok(op()),
            Some(0) => Err(AdiError::invalid_config("max_workers must be at least 1")),
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|err| AdiError::ThreadPool(err.to_string()))?;
                Ok(pool.install(op))
            }
        }
    }
}

/// Parameters of the temporal pruning applied when an annulus view is built
/// with per-frame angles.
///
/// The minimum parallactic-angle step between kept frames is
/// `rad2deg(2 * atan(threshold * fwhm / (2 * radius)))`.
///
/// # Fields
/// - `threshold`: tolerated loss, in units of fwhm at the representative radius.
/// - `fwhm`: full width at half maximum of the PSF, in pixels.
/// - `radius`: representative radius in pixels; `None` uses the band's mid radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PruneConfig {
    pub threshold: f64,
    pub fwhm: f64,
    pub radius: Option<f64>,
}

impl PruneConfig {
    pub fn new(threshold: f64, fwhm: f64) -> Self {
        PruneConfig {
            threshold,
            fwhm,
            radius: None,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
            return Err(AdiError::invalid_config(format!(
                "pruning threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        if !(self.fwhm > 0.0 && self.fwhm.is_finite()) {
            return Err(AdiError::invalid_config(format!(
                "fwhm must be finite and positive, got {}",
                self.fwhm
            )));
        }
        if let Some(radius) = self.radius {
            if !(radius > 0.0 && radius.is_finite()) {
                return Err(AdiError::invalid_config(format!(
                    "representative radius must be finite and positive, got {radius}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_runs_on_global_pool() {
        let config = DerotateConfig::default();
        assert_eq!(config.install(|| rayon::current_num_threads() > 0), Ok(true));
    }

    #[test]
    fn test_max_workers_sizes_dedicated_pool() {
        let config = DerotateConfig::default().with_max_workers(2);
        assert_eq!(config.install(rayon::current_num_threads), Ok(2));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = DerotateConfig::default().with_max_workers(0);
        assert!(matches!(
            config.install(|| ()),
            Err(AdiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_prune_config_validation() {
        assert!(PruneConfig::new(0.5, 4.0).validate().is_ok());
        assert!(PruneConfig::new(-0.1, 4.0).validate().is_err());
        assert!(PruneConfig::new(0.5, 0.0).validate().is_err());
        assert!(PruneConfig::new(0.5, 4.0).with_radius(0.0).validate().is_err());
    }
}
