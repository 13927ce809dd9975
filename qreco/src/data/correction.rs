//! Noise suppression and electron-lifetime correction.
//!
//! Cells below the noise threshold are dropped; surviving cells are scaled by
//! `exp(t / tau)` where `t` is the drift time of the cell's drift-axis bin center.
//! The pass is not idempotent: running it twice applies the correction twice.

use log::debug;
use serde::{Deserialize, Serialize};

use qgrid::constants::drift_time;
use qgrid::{AxisKind, ChargeGrid};

use crate::data::config::ReadoutConfig;

/// Drift-velocity / electron-lifetime pair used to undo attachment losses.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifetimeModel {
    pub drift_velocity: f64,
    pub electron_lifetime: f64,
}

impl LifetimeModel {
    pub fn new(drift_velocity: f64, electron_lifetime: f64) -> Self {
        LifetimeModel { drift_velocity, electron_lifetime }
    }

    pub fn from_config(config: &ReadoutConfig) -> Self {
        LifetimeModel::new(config.drift_velocity, config.electron_lifetime)
    }

    /// Factor recovering the charge deposited at drift coordinate `x` (mm).
    #[inline]
    pub fn correction_factor(&self, x: f64) -> f64 {
        (drift_time(x, self.drift_velocity) / self.electron_lifetime).exp()
    }
}

/// Counts of one suppression/correction pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub suppressed: usize,
    pub corrected: usize,
}

/// Zeroes every cell below `threshold` and lifetime-corrects the rest, in place.
///
/// # Arguments
///
/// * `grid` - Grid to correct; every stored cell is visited regardless of any range restriction.
/// * `threshold` - Cells with charge strictly below it are treated as noise.
/// * `model` - Drift velocity and electron lifetime.
///
pub fn apply_suppression_and_correction(
    grid: &mut ChargeGrid,
    threshold: f64,
    model: &LifetimeModel,
) -> CorrectionReport {
    let drift_axis = grid.axis(AxisKind::Drift).clone();
    let mut report = CorrectionReport::default();

    grid.update_cells(|idx, q| {
        if q < threshold {
            report.suppressed += 1;
            0.0
        } else {
            report.corrected += 1;
            q * model.correction_factor(drift_axis.bin_center(idx[AxisKind::Drift.index()]))
        }
    });

    debug!(
        "suppression (thr = {}): {} cells dropped, {} cells corrected",
        threshold, report.suppressed, report.corrected
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgrid::Axis;

    fn grid() -> ChargeGrid {
        ChargeGrid::new([
            Axis::for_kind(AxisKind::Drift, 0.0, 2000.0, 10.0).unwrap(),
            Axis::for_kind(AxisKind::T1, 0.0, 100.0, 10.0).unwrap(),
            Axis::for_kind(AxisKind::T2, 0.0, 100.0, 10.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_correction_factor() {
        let model = LifetimeModel::new(2.0, 100.0);
        // x = 400 mm -> t = 200 ns -> exp(2)
        assert!((model.correction_factor(400.0) - 2f64.exp()).abs() < 1e-12);
        assert!((model.correction_factor(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_suppression_and_correction() {
        let mut g = grid();
        g.set([0, 1, 1], 10.0);
        g.set([99, 1, 1], 500.0);
        g.set([50, 2, 2], 100.0);

        let model = LifetimeModel::new(1.0, 1000.0);
        let report = apply_suppression_and_correction(&mut g, 100.0, &model);

        assert_eq!(report, CorrectionReport { suppressed: 1, corrected: 2 });
        assert_eq!(g.get([0, 1, 1]), 0.0);
        // bin 99 center = 995 mm -> t = 995 ns
        assert!((g.get([99, 1, 1]) - 500.0 * (0.995f64).exp()).abs() < 1e-9);
        // a cell exactly at threshold survives
        assert!((g.get([50, 2, 2]) - 100.0 * (0.505f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_double_application_compounds() {
        let mut g = grid();
        g.set([20, 3, 3], 1000.0);
        let model = LifetimeModel::new(1.0, 500.0);

        apply_suppression_and_correction(&mut g, 100.0, &model);
        apply_suppression_and_correction(&mut g, 100.0, &model);

        // center 205 mm -> t = 205 ns, applied twice
        let expected = 1000.0 * (2.0 * 205.0 / 500.0f64).exp();
        assert!((g.get([20, 3, 3]) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_correction_ignores_range_restriction() {
        let mut g = grid();
        g.set([1, 1, 1], 1000.0);
        g.set([150, 1, 1], 200.0);
        g.narrow_to_populated_range(500.0, 0);
        assert_eq!(g.populated_cells().len(), 1);
        let report = apply_suppression_and_correction(&mut g, 100.0, &LifetimeModel::new(1.0, 1e9));
        assert_eq!(report.corrected, 2);
    }
}
