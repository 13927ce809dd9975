use std::fmt;
use std::fmt::{Display, Formatter};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::constants::{DRIFT_LABEL, T1_LABEL, T2_LABEL};
use crate::error::{ReadoutError, Result};

/// Names the three dimensions of a charge grid.
///
/// # Description
///
/// The first axis is always the drift coordinate (convertible to a drift time through
/// the drift velocity), the two others are the transverse coordinates of the anode plane.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum AxisKind {
    Drift,
    T1,
    T2,
}

impl AxisKind {
    pub const ALL: [AxisKind; 3] = [AxisKind::Drift, AxisKind::T1, AxisKind::T2];

    /// Position of this axis inside a cell index triple.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            AxisKind::Drift => 0,
            AxisKind::T1 => 1,
            AxisKind::T2 => 2,
        }
    }

    /// Default title used for axes built without one.
    pub fn default_title(self) -> &'static str {
        match self {
            AxisKind::Drift => DRIFT_LABEL,
            AxisKind::T1 => T1_LABEL,
            AxisKind::T2 => T2_LABEL,
        }
    }
}

impl TryFrom<usize> for AxisKind {
    type Error = ReadoutError;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            0 => Ok(AxisKind::Drift),
            1 => Ok(AxisKind::T1),
            2 => Ok(AxisKind::T2),
            _ => Err(ReadoutError::AxisIndex(value)),
        }
    }
}

impl Display for AxisKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AxisKind::Drift => write!(f, "Drift"),
            AxisKind::T1 => write!(f, "T1"),
            AxisKind::T2 => write!(f, "T2"),
        }
    }
}

/// One binned dimension of a charge grid.
///
/// The number of bins is derived from the requested range and pitch, rounded down,
/// and the upper edge is moved so that `max = min + pitch * n_bins` always holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Axis {
    title: String,
    min: f64,
    max: f64,
    pitch: f64,
    n_bins: usize,
}

impl Axis {
    /// Constructs a new `Axis`.
    ///
    /// # Arguments
    ///
    /// * `title` - Label of the axis, e.g. `"x [mm]"`.
    /// * `min` - Lower edge of the first bin.
    /// * `max` - Requested upper edge; rounded down to a whole number of bins.
    /// * `pitch` - Bin width.
    ///
    /// # Errors
    ///
    /// Returns `ReadoutError::InvalidAxis` for non-finite inputs, `min >= max`,
    /// a non-positive pitch, or a pitch wider than the requested range.
    ///
    /// # Example
    ///
    /// ```
    /// use qgrid::Axis;
    ///
    /// let axis = Axis::new("x [mm]", 0.0, 10.5, 2.0).unwrap();
    /// assert_eq!(axis.n_bins(), 5);
    /// assert_eq!(axis.max(), 10.0);
    /// ```
    pub fn new(title: impl Into<String>, min: f64, max: f64, pitch: f64) -> Result<Self> {
        let title = title.into();

        if !(min.is_finite() && max.is_finite() && pitch.is_finite()) {
            return Err(ReadoutError::axis(title, "bounds and pitch must be finite"));
        }
        if min >= max {
            return Err(ReadoutError::axis(title, format!("min ({}) must be below max ({})", min, max)));
        }
        if pitch <= 0.0 {
            return Err(ReadoutError::axis(title, format!("pitch must be positive, got {}", pitch)));
        }

        let n_bins = ((max - min) / pitch).floor() as usize;
        if n_bins == 0 {
            return Err(ReadoutError::axis(title, format!("pitch {} exceeds the range [{}, {})", pitch, min, max)));
        }

        Ok(Axis {
            title,
            min,
            max: min + pitch * n_bins as f64,
            pitch,
            n_bins,
        })
    }

    /// Builds an axis titled after its kind.
    pub fn for_kind(kind: AxisKind, min: f64, max: f64, pitch: f64) -> Result<Self> {
        Axis::new(kind.default_title(), min, max, pitch)
    }

    /// Re-checks the invariants of an axis that did not go through `new`, e.g. a decoded one.
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.pitch.is_finite()) || self.pitch <= 0.0 {
            return Err(ReadoutError::axis(self.title.clone(), "bounds and pitch must be finite, pitch positive"));
        }
        if self.n_bins == 0 {
            return Err(ReadoutError::axis(self.title.clone(), "axis has no bins"));
        }
        let expected = self.min + self.pitch * self.n_bins as f64;
        if (expected - self.max).abs() > 1e-9 * self.pitch.max(1.0) * self.n_bins as f64 {
            return Err(ReadoutError::axis(self.title.clone(), "max does not match min + pitch * n_bins"));
        }
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Bin holding coordinate `x`, `None` outside `[min, max)`.
    #[inline]
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.min || x >= self.max {
            return None;
        }
        let bin = ((x - self.min) / self.pitch).floor() as usize;
        // rounding can push a coordinate just below max into the overflow bin
        (bin < self.n_bins).then_some(bin)
    }

    #[inline]
    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.pitch
    }

    #[inline]
    pub fn bin_low_edge(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.pitch
    }

    #[inline]
    pub fn bin_up_edge(&self, bin: usize) -> f64 {
        self.min + (bin + 1) as f64 * self.pitch
    }

    /// Bin reached by moving `delta` bins away from `bin`, `None` when it leaves the axis.
    #[inline]
    pub fn offset(&self, bin: usize, delta: isize) -> Option<usize> {
        bin.checked_add_signed(delta).filter(|&b| b < self.n_bins)
    }

    /// Bin centers of every bin, in order.
    pub fn centers(&self) -> Vec<f64> {
        (0..self.n_bins).map(|b| self.bin_center(b)).collect()
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Axis({}, [{}, {}), pitch: {}, bins: {})", self.title, self.min, self.max, self.pitch, self.n_bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_count_rounds_down() {
        let axis = Axis::new("y [mm]", -10.0, 15.0, 4.0).unwrap();
        assert_eq!(axis.n_bins(), 6);
        assert!((axis.max() - 14.0).abs() < 1e-12);
        assert!(axis.validate().is_ok());
    }

    #[test]
    fn test_invalid_axes() {
        assert!(matches!(Axis::new("a", 1.0, 1.0, 0.5), Err(ReadoutError::InvalidAxis { .. })));
        assert!(matches!(Axis::new("a", 2.0, 1.0, 0.5), Err(ReadoutError::InvalidAxis { .. })));
        assert!(matches!(Axis::new("a", 0.0, 1.0, 0.0), Err(ReadoutError::InvalidAxis { .. })));
        assert!(matches!(Axis::new("a", 0.0, 1.0, -1.0), Err(ReadoutError::InvalidAxis { .. })));
        assert!(matches!(Axis::new("a", 0.0, 1.0, 2.0), Err(ReadoutError::InvalidAxis { .. })));
        assert!(matches!(Axis::new("a", f64::NAN, 1.0, 0.1), Err(ReadoutError::InvalidAxis { .. })));
    }

    #[test]
    fn test_find_bin_and_centers() {
        let axis = Axis::new("z [mm]", 0.0, 10.0, 2.5).unwrap();
        assert_eq!(axis.find_bin(0.0), Some(0));
        assert_eq!(axis.find_bin(2.4), Some(0));
        assert_eq!(axis.find_bin(2.5), Some(1));
        assert_eq!(axis.find_bin(9.99), Some(3));
        assert_eq!(axis.find_bin(10.0), None);
        assert_eq!(axis.find_bin(-0.01), None);
        assert_eq!(axis.find_bin(f64::INFINITY), None);
        assert!((axis.bin_center(1) - 3.75).abs() < 1e-12);
        assert!((axis.bin_low_edge(1) - 2.5).abs() < 1e-12);
        assert!((axis.bin_up_edge(1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_stays_on_axis() {
        let axis = Axis::new("x", 0.0, 5.0, 1.0).unwrap();
        assert_eq!(axis.offset(0, -1), None);
        assert_eq!(axis.offset(0, 2), Some(2));
        assert_eq!(axis.offset(4, 1), None);
        assert_eq!(axis.offset(3, -2), Some(1));
    }

    #[test]
    fn test_axis_kind_index() {
        for (i, kind) in AxisKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(AxisKind::try_from(i).unwrap(), *kind);
        }
        assert!(matches!(AxisKind::try_from(3), Err(ReadoutError::AxisIndex(3))));
    }
}
