//! Readout configuration.
//!
//! Collects every tunable constant of the suppression, correction and clustering
//! passes so that none of them lives in module-level state.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use qgrid::constants::{E_LIFETIME, V_DRIFT};
use qgrid::{ReadoutError, Result};

/// How the clustering engine moves on from a seed cell once its cross
/// neighbourhood has been claimed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exploration {
    /// Jump to a random point near the head or tail of the cluster just grown,
    /// for a bounded number of trials.
    #[default]
    Stochastic,
    /// Deterministic worklist over every accepted cell (no randomness).
    FloodFill,
}

/// Tunable constants of one readout.
///
/// Lengths are in mm, times in ns, charges in the grid's own units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadoutConfig {
    // Suppression and lifetime correction
    pub noise_threshold: f64,
    pub electron_lifetime: f64,
    pub drift_velocity: f64,

    // Clustering
    pub acceptance_threshold: f64,
    pub max_link_distance: f64,
    pub max_trials: usize,
    pub exploration: Exploration,
    /// `None` seeds the continuation sampler from entropy.
    pub seed: Option<u64>,

    // Bounding-box narrowing applied before clustering
    pub range_threshold: f64,
    pub range_margin_bins: usize,
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 100.0,
            electron_lifetime: E_LIFETIME,
            drift_velocity: V_DRIFT,

            acceptance_threshold: 1500.0,
            max_link_distance: 15.0,
            max_trials: 5,
            exploration: Exploration::Stochastic,
            seed: None,

            range_threshold: 10.0,
            range_margin_bins: 1,
        }
    }
}

impl ReadoutConfig {
    /// Default constants with a fixed seed, for runs that must be repeatable.
    pub fn reproducible(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Default constants with the deterministic flood-fill exploration.
    pub fn flood_fill() -> Self {
        Self {
            exploration: Exploration::FloodFill,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("noise_threshold", self.noise_threshold),
            ("acceptance_threshold", self.acceptance_threshold),
            ("range_threshold", self.range_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ReadoutError::config(format!("{} must be finite and >= 0, got {}", name, value)));
            }
        }

        let positive = [
            ("electron_lifetime", self.electron_lifetime),
            ("drift_velocity", self.drift_velocity),
            ("max_link_distance", self.max_link_distance),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReadoutError::config(format!("{} must be finite and > 0, got {}", name, value)));
            }
        }

        if self.max_trials == 0 {
            return Err(ReadoutError::config("max_trials must be at least 1"));
        }
        Ok(())
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: ReadoutConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: ReadoutConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}
