use std::fmt;
use std::fmt::{Display, Formatter};
use bincode::{Decode, Encode};
use itertools::Itertools;
use log::trace;
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ReadoutError, Result};
use crate::grid::axis::{Axis, AxisKind};

/// Bin-index triple `(drift, t1, t2)` addressing one cell.
pub type CellIndex = [usize; 3];

/// Linearised cell key, unique within the grid that produced it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode)]
pub struct CellId(pub u64);

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive window of bins on one axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRange {
    pub lo: usize,
    pub hi: usize,
}

impl BinRange {
    #[inline]
    pub fn contains(&self, bin: usize) -> bool {
        bin >= self.lo && bin <= self.hi
    }
}

/// Sparse 3-D accumulator of charge.
///
/// Only non-zero cells are stored: writing exactly zero removes the cell, so
/// "populated" and "non-zero" mean the same thing. An optional per-axis bin range
/// restricts which cells `populated_cells` and `for_each_populated` visit; direct
/// reads and writes ignore it.
#[derive(Clone, Debug)]
pub struct ChargeGrid {
    axes: [Axis; 3],
    cells: FxHashMap<CellIndex, f64>,
    ranges: [Option<BinRange>; 3],
}

impl ChargeGrid {
    /// Empty grid over `axes`.
    ///
    /// Fails with `InvalidAxis` when the total number of cells does not fit a `CellId`.
    pub fn new(axes: [Axis; 3]) -> Result<Self> {
        let n_cells = (axes[0].n_bins() as u64)
            .checked_mul(axes[1].n_bins() as u64)
            .and_then(|n| n.checked_mul(axes[2].n_bins() as u64));
        if n_cells.is_none() {
            return Err(ReadoutError::axis(
                axes[2].title(),
                format!(
                    "{} x {} x {} cells overflow the cell id range",
                    axes[0].n_bins(),
                    axes[1].n_bins(),
                    axes[2].n_bins()
                ),
            ));
        }
        Ok(ChargeGrid {
            axes,
            cells: FxHashMap::default(),
            ranges: [None; 3],
        })
    }

    /// Fresh grid with the same axes and no content.
    pub fn empty_like(&self) -> Self {
        ChargeGrid {
            axes: self.axes.clone(),
            cells: FxHashMap::default(),
            ranges: [None; 3],
        }
    }

    /// Number of addressable cells.
    pub fn n_cells(&self) -> u64 {
        self.axes.iter().map(|axis| axis.n_bins() as u64).product()
    }

    pub fn axes(&self) -> &[Axis; 3] {
        &self.axes
    }

    #[inline]
    pub fn axis(&self, kind: AxisKind) -> &Axis {
        &self.axes[kind.index()]
    }

    #[inline]
    pub fn bin_center(&self, kind: AxisKind, bin: usize) -> f64 {
        self.axis(kind).bin_center(bin)
    }

    /// Spatial center of a cell.
    pub fn cell_center(&self, idx: CellIndex) -> Point3<f64> {
        Point3::new(
            self.axes[0].bin_center(idx[0]),
            self.axes[1].bin_center(idx[1]),
            self.axes[2].bin_center(idx[2]),
        )
    }

    /// Cell holding `position`, `None` if any coordinate is outside its axis.
    pub fn find_cell(&self, position: [f64; 3]) -> Option<CellIndex> {
        Some([
            self.axes[0].find_bin(position[0])?,
            self.axes[1].find_bin(position[1])?,
            self.axes[2].find_bin(position[2])?,
        ])
    }

    #[inline]
    pub fn contains_index(&self, idx: CellIndex) -> bool {
        idx.iter().zip(self.axes.iter()).all(|(&b, axis)| b < axis.n_bins())
    }

    #[inline]
    pub fn cell_id(&self, idx: CellIndex) -> CellId {
        let n0 = self.axes[0].n_bins() as u64;
        let n1 = self.axes[1].n_bins() as u64;
        CellId(idx[0] as u64 + n0 * (idx[1] as u64 + n1 * idx[2] as u64))
    }

    /// Inverse of `cell_id`, `None` for ids outside this grid.
    pub fn cell_index(&self, id: CellId) -> Option<CellIndex> {
        let n0 = self.axes[0].n_bins() as u64;
        let n1 = self.axes[1].n_bins() as u64;
        if id.0 >= self.n_cells() {
            return None;
        }
        let i0 = id.0 % n0;
        let rest = id.0 / n0;
        Some([i0 as usize, (rest % n1) as usize, (rest / n1) as usize])
    }

    /// Adds `weight` to the cell holding `position`.
    ///
    /// Positions outside the grid on any axis are dropped without error; the cell
    /// that received the weight is returned otherwise.
    pub fn fill(&mut self, position: [f64; 3], weight: f64) -> Option<CellIndex> {
        let Some(idx) = self.find_cell(position) else {
            trace!("dropping fill at {:?} (w = {}): outside grid", position, weight);
            return None;
        };
        let value = self.get(idx) + weight;
        self.set(idx, value);
        Some(idx)
    }

    /// Stored charge of a cell, 0 for empty or out-of-grid cells.
    #[inline]
    pub fn get(&self, idx: CellIndex) -> f64 {
        self.cells.get(&idx).copied().unwrap_or(0.0)
    }

    /// Overwrites a cell; zero removes it. Out-of-grid indices are ignored.
    pub fn set(&mut self, idx: CellIndex, value: f64) {
        if !self.contains_index(idx) {
            trace!("ignoring write to {:?}: outside grid", idx);
            return;
        }
        if value == 0.0 {
            self.cells.remove(&idx);
        } else {
            self.cells.insert(idx, value);
        }
    }

    /// Number of stored (non-zero) cells, regardless of the active range.
    pub fn populated_len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sum of all stored charge.
    pub fn integral(&self) -> f64 {
        self.cells.values().sum()
    }

    /// Every stored cell, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = (CellIndex, f64)> + '_ {
        self.cells.iter().map(|(idx, v)| (*idx, *v))
    }

    #[inline]
    fn in_range(&self, idx: &CellIndex) -> bool {
        self.ranges
            .iter()
            .zip(idx.iter())
            .all(|(range, &b)| range.map_or(true, |r| r.contains(b)))
    }

    /// Populated cells inside the active range, ordered by ascending `CellId`.
    pub fn populated_cells(&self) -> Vec<(CellIndex, f64)> {
        self.cells
            .iter()
            .filter(|(idx, _)| self.in_range(idx))
            .map(|(idx, v)| (*idx, *v))
            .sorted_by_key(|(idx, _)| self.cell_id(*idx))
            .collect()
    }

    /// Visits populated cells inside the active range while allowing the callback to mutate the grid.
    ///
    /// The visit order is fixed up front (ascending `CellId`). Before each call the cell is
    /// re-read, so a cell zeroed by an earlier callback is skipped, and the callback receives
    /// the current value.
    pub fn for_each_populated<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut ChargeGrid, CellIndex, f64),
    {
        let worklist: Vec<CellIndex> = self.populated_cells().into_iter().map(|(idx, _)| idx).collect();
        for idx in worklist {
            let value = self.get(idx);
            if value == 0.0 {
                continue;
            }
            f(self, idx, value);
        }
    }

    /// Rewrites every stored cell with `f(index, value)`, ignoring the active range.
    /// Cells mapped to zero are removed.
    pub fn update_cells<F>(&mut self, mut f: F)
    where
        F: FnMut(CellIndex, f64) -> f64,
    {
        self.cells.retain(|idx, value| {
            *value = f(*idx, *value);
            *value != 0.0
        });
    }

    /// Charge summed over the two other axes, one entry per bin of `kind`.
    pub fn projection_1d(&self, kind: AxisKind) -> Vec<f64> {
        let d = kind.index();
        let mut out = vec![0.0; self.axes[d].n_bins()];
        for (idx, v) in self.cells.iter() {
            out[idx[d]] += *v;
        }
        out
    }

    /// Charge summed over the remaining axis, indexed `[bin_a][bin_b]`.
    pub fn projection_2d(&self, a: AxisKind, b: AxisKind) -> Vec<Vec<f64>> {
        let (da, db) = (a.index(), b.index());
        let mut out = vec![vec![0.0; self.axes[db].n_bins()]; self.axes[da].n_bins()];
        for (idx, v) in self.cells.iter() {
            out[idx[da]][idx[db]] += *v;
        }
        out
    }

    /// Restricts iteration to the bounding box of the charge.
    ///
    /// For each axis the first and last bin whose 1-D projection exceeds `threshold`
    /// bound the range, widened by `margin` bins on both sides and clamped to the axis.
    /// An axis without any bin above threshold keeps its full range.
    pub fn narrow_to_populated_range(&mut self, threshold: f64, margin: usize) {
        for kind in AxisKind::ALL {
            let projection = self.projection_1d(kind);
            let first = projection.iter().position(|&q| q > threshold);
            let last = projection.iter().rposition(|&q| q > threshold);
            let d = kind.index();
            self.ranges[d] = match (first, last) {
                (Some(lo), Some(hi)) => Some(BinRange {
                    lo: lo.saturating_sub(margin),
                    hi: hi.saturating_add(margin).min(self.axes[d].n_bins() - 1),
                }),
                _ => None,
            };
            trace!("axis {} range narrowed to {:?}", kind, self.ranges[d]);
        }
    }

    /// Active bin range of an axis (the full axis when unrestricted).
    pub fn range(&self, kind: AxisKind) -> BinRange {
        let d = kind.index();
        self.ranges[d].unwrap_or(BinRange { lo: 0, hi: self.axes[d].n_bins() - 1 })
    }

    pub fn reset_ranges(&mut self) {
        self.ranges = [None; 3];
    }

    /// Clears all content and range restrictions, keeping the axes.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.reset_ranges();
    }
}

impl Display for ChargeGrid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChargeGrid([{}, {}, {}], populated: {}, integral: {:.3})",
            self.axes[0],
            self.axes[1],
            self.axes[2],
            self.cells.len(),
            self.integral()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChargeGrid {
        ChargeGrid::new([
            Axis::for_kind(AxisKind::Drift, 0.0, 100.0, 5.0).unwrap(),
            Axis::for_kind(AxisKind::T1, -50.0, 50.0, 5.0).unwrap(),
            Axis::for_kind(AxisKind::T2, -50.0, 50.0, 5.0).unwrap(),
        ])
        .unwrap()
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_fill_accumulates() {
        let mut g = grid();
        let a = g.fill([12.0, 1.0, 1.0], 100.0);
        let b = g.fill([13.0, 2.0, 4.0], 50.0);
        assert_eq!(a, Some([2, 10, 10]));
        assert_eq!(a, b);
        assert!((g.get([2, 10, 10]) - 150.0).abs() < 1e-12);
        assert_eq!(g.populated_len(), 1);
    }

    #[test]
    fn test_out_of_range_fill_is_dropped() {
        init_logger();
        let mut g = grid();
        assert_eq!(g.fill([100.0, 0.0, 0.0], 10.0), None);
        assert_eq!(g.fill([50.0, -50.1, 0.0], 10.0), None);
        assert_eq!(g.fill([50.0, 0.0, f64::NAN], 10.0), None);
        assert!(g.is_empty());
        assert_eq!(g.integral(), 0.0);
    }

    #[test]
    fn test_set_zero_removes_cell() {
        let mut g = grid();
        g.set([1, 1, 1], 5.0);
        assert_eq!(g.populated_len(), 1);
        g.set([1, 1, 1], 0.0);
        assert!(g.is_empty());
        g.set([40, 0, 0], 5.0);
        assert!(g.is_empty());
    }

    #[test]
    fn test_cell_id_round_trip() {
        let g = grid();
        let idx = [19, 3, 7];
        let id = g.cell_id(idx);
        assert_eq!(id, CellId(19 + 20 * (3 + 20 * 7)));
        assert_eq!(g.cell_index(id), Some(idx));
        assert_eq!(g.cell_index(CellId(20 * 20 * 20)), None);
    }

    #[test]
    fn test_cell_count_overflow_is_rejected() {
        let fine = || Axis::new("x [mm]", 0.0, 10_000.0, 0.001).unwrap();
        assert_eq!(fine().n_bins(), 10_000_000);
        let result = ChargeGrid::new([fine(), fine(), fine()]);
        assert!(matches!(result, Err(ReadoutError::InvalidAxis { .. })));

        // 1e7 x 1e7 x 1 still fits, and the last cell id is addressable
        let narrow = Axis::new("z [mm]", 0.0, 1.0, 1.0).unwrap();
        let g = ChargeGrid::new([fine(), fine(), narrow]).unwrap();
        let last = [9_999_999, 9_999_999, 0];
        assert_eq!(g.n_cells(), 100_000_000_000_000);
        assert_eq!(g.cell_index(g.cell_id(last)), Some(last));
    }

    #[test]
    fn test_cell_center() {
        let g = grid();
        let c = g.cell_center([2, 10, 10]);
        assert!((c.x - 12.5).abs() < 1e-12);
        assert!((c.y - 2.5).abs() < 1e-12);
        assert!((c.z - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_for_each_populated_skips_zeroed_cells() {
        let mut g = grid();
        g.set([1, 0, 0], 1.0);
        g.set([2, 0, 0], 2.0);
        g.set([3, 0, 0], 3.0);

        let mut visited = Vec::new();
        g.for_each_populated(|grid, idx, _| {
            visited.push(idx);
            // claiming the first cell also claims its neighbours
            grid.set([2, 0, 0], 0.0);
            grid.set([3, 0, 0], 0.0);
        });
        assert_eq!(visited, vec![[1, 0, 0]]);
    }

    #[test]
    fn test_populated_cells_order() {
        let mut g = grid();
        g.set([0, 0, 5], 1.0);
        g.set([0, 5, 0], 1.0);
        g.set([5, 0, 0], 1.0);
        let order: Vec<CellIndex> = g.populated_cells().into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![[5, 0, 0], [0, 5, 0], [0, 0, 5]]);
    }

    #[test]
    fn test_projections() {
        let mut g = grid();
        g.set([1, 2, 3], 10.0);
        g.set([1, 4, 3], 5.0);
        g.set([2, 2, 0], 1.0);
        let p = g.projection_1d(AxisKind::Drift);
        assert_eq!(p.len(), 20);
        assert!((p[1] - 15.0).abs() < 1e-12);
        assert!((p[2] - 1.0).abs() < 1e-12);
        let p2 = g.projection_2d(AxisKind::T1, AxisKind::T2);
        assert!((p2[2][3] - 10.0).abs() < 1e-12);
        assert!((p2[2][0] - 1.0).abs() < 1e-12);
        assert!((p2[4][3] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_narrow_to_populated_range() {
        let mut g = grid();
        g.set([5, 10, 10], 100.0);
        g.set([8, 12, 10], 100.0);
        // below threshold, excluded from the bounding box
        g.set([15, 1, 1], 5.0);
        g.narrow_to_populated_range(10.0, 1);
        assert_eq!(g.range(AxisKind::Drift), BinRange { lo: 4, hi: 9 });
        assert_eq!(g.range(AxisKind::T1), BinRange { lo: 9, hi: 13 });
        assert_eq!(g.range(AxisKind::T2), BinRange { lo: 9, hi: 11 });
        assert_eq!(g.populated_cells().len(), 2);
        // direct access ignores the range
        assert!((g.get([15, 1, 1]) - 5.0).abs() < 1e-12);

        g.reset_ranges();
        assert_eq!(g.populated_cells().len(), 3);
    }

    #[test]
    fn test_narrow_clamps_to_axis() {
        let mut g = grid();
        g.set([0, 19, 0], 100.0);
        g.narrow_to_populated_range(10.0, 2);
        assert_eq!(g.range(AxisKind::Drift), BinRange { lo: 0, hi: 2 });
        assert_eq!(g.range(AxisKind::T1), BinRange { lo: 17, hi: 19 });
    }

    #[test]
    fn test_narrow_with_huge_margin() {
        init_logger();
        let mut g = grid();
        g.set([3, 4, 5], 100.0);
        g.narrow_to_populated_range(10.0, usize::MAX);
        assert_eq!(g.range(AxisKind::Drift), BinRange { lo: 0, hi: 19 });
        assert_eq!(g.populated_cells().len(), 1);
    }

    #[test]
    fn test_update_cells() {
        let mut g = grid();
        g.set([1, 1, 1], 10.0);
        g.set([2, 2, 2], 1.0);
        g.update_cells(|_, v| if v < 5.0 { 0.0 } else { v * 2.0 });
        assert_eq!(g.populated_len(), 1);
        assert!((g.get([1, 1, 1]) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_keeps_axes() {
        let mut g = grid();
        g.set([1, 1, 1], 10.0);
        g.narrow_to_populated_range(0.0, 0);
        g.reset();
        assert!(g.is_empty());
        assert_eq!(g.range(AxisKind::T2), BinRange { lo: 0, hi: 19 });
        assert_eq!(g.axis(AxisKind::T2).n_bins(), 20);
        assert!(g.empty_like().is_empty());
    }
}
