//! Clustering engine.
//!
//! Walks the populated cells of a working copy of the charge grid and, from each seed,
//! claims every cell above the acceptance threshold found in the cross neighbourhood
//! (two bins either way along one axis at a time). Claimed cells are handed to the
//! [`ClusterSet`] and zeroed in the working copy, so no cell is claimed twice.
//!
//! Two ways of moving on from a seed are available:
//!
//! - `Stochastic`: after each pass that grew a cluster, restart the scan from a random
//!   point among the first or last five points of that cluster. Passes continue while
//!   the previous pass found something *or* fewer than `max_trials` passes were made.
//! - `FloodFill`: push every claimed cell on a stack and scan around each of them.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use qgrid::{AxisKind, CellIndex, ChargeGrid};

use crate::cluster::cluster::{ClusterId, ClusterPoint};
use crate::cluster::registry::{ClusterOutcome, ClusterSet};
use crate::data::config::{Exploration, ReadoutConfig};

/// Half width (in bins) of the cross neighbourhood.
pub const CROSS_HALF_WIDTH: isize = 2;

/// Number of points at either end of a cluster eligible as continuation seeds.
const CONTINUATION_SPAN: f64 = 5.0;

/// Counters of one engine run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Outer-loop cells that were still populated when reached.
    pub seeds: usize,
    /// Cross-neighbourhood scans.
    pub passes: usize,
    /// Cells claimed from the working grid.
    pub claimed: usize,
    /// Claimed cells that were already registered in a cluster.
    pub duplicates: usize,
}

pub struct ClusterEngine<R: Rng> {
    acceptance_threshold: f64,
    max_trials: usize,
    exploration: Exploration,
    rng: R,
}

impl ClusterEngine<StdRng> {
    /// Engine with the constants of `config`, seeded from `config.seed` (entropy if unset).
    pub fn from_config(config: &ReadoutConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ClusterEngine::with_rng(config, rng)
    }
}

impl<R: Rng> ClusterEngine<R> {
    pub fn with_rng(config: &ReadoutConfig, rng: R) -> Self {
        ClusterEngine {
            acceptance_threshold: config.acceptance_threshold,
            max_trials: config.max_trials,
            exploration: config.exploration,
            rng,
        }
    }

    /// Clusters the populated cells of `working` into `clusters`.
    ///
    /// `working` is consumed: every claimed cell is zeroed. Callers that need the
    /// grid afterwards must pass a copy. Cells visited by the outer loop but below the
    /// acceptance threshold are left in place.
    pub fn run(&mut self, working: &mut ChargeGrid, clusters: &mut ClusterSet) -> EngineStats {
        let mut stats = EngineStats::default();
        let n_before = clusters.len();

        working.for_each_populated(|grid, seed, _| {
            stats.seeds += 1;
            match self.exploration {
                Exploration::Stochastic => self.explore_stochastic(grid, seed, clusters, &mut stats),
                Exploration::FloodFill => self.explore_flood_fill(grid, seed, clusters, &mut stats),
            }
        });

        info!(
            "clustering: {} seeds, {} passes, {} cells claimed, {} new clusters ({} total)",
            stats.seeds,
            stats.passes,
            stats.claimed,
            clusters.len() - n_before,
            clusters.len()
        );
        stats
    }

    fn explore_stochastic(
        &mut self,
        grid: &mut ChargeGrid,
        seed: CellIndex,
        clusters: &mut ClusterSet,
        stats: &mut EngineStats,
    ) {
        let mut idx = seed;
        let mut accepted = Vec::new();
        let mut bin_found = false;
        let mut trial = 0;

        while bin_found || trial < self.max_trials {
            accepted.clear();
            let last = self.scan_cross(grid, idx, clusters, &mut accepted, stats);
            bin_found = !accepted.is_empty();

            if let Some(id) = last.and_then(|outcome| outcome.cluster_id()) {
                if let Some(next) = self.continuation(grid, clusters, id) {
                    idx = next;
                }
            }
            trial += 1;
        }
    }

    fn explore_flood_fill(
        &mut self,
        grid: &mut ChargeGrid,
        seed: CellIndex,
        clusters: &mut ClusterSet,
        stats: &mut EngineStats,
    ) {
        let mut stack = vec![seed];
        let mut accepted = Vec::new();

        while let Some(idx) = stack.pop() {
            accepted.clear();
            self.scan_cross(grid, idx, clusters, &mut accepted, stats);
            stack.extend(accepted.iter().copied().filter(|&cell| cell != idx));
        }
    }

    /// Claims every cell above threshold in the cross neighbourhood of `idx`.
    ///
    /// Claimed indices are appended to `accepted`; the outcome of the last claim is returned.
    fn scan_cross(
        &self,
        grid: &mut ChargeGrid,
        idx: CellIndex,
        clusters: &mut ClusterSet,
        accepted: &mut Vec<CellIndex>,
        stats: &mut EngineStats,
    ) -> Option<ClusterOutcome> {
        stats.passes += 1;
        let mut last = None;

        for kind in AxisKind::ALL {
            let d = kind.index();
            for delta in -CROSS_HALF_WIDTH..=CROSS_HALF_WIDTH {
                let Some(bin) = grid.axis(kind).offset(idx[d], delta) else {
                    continue;
                };
                let mut probe = idx;
                probe[d] = bin;

                let q = grid.get(probe);
                if q > self.acceptance_threshold {
                    let point = ClusterPoint::new(grid.cell_center(probe), grid.cell_id(probe), q);
                    let outcome = clusters.find_cluster(point);
                    if outcome == ClusterOutcome::AlreadyPresent {
                        stats.duplicates += 1;
                    }
                    grid.set(probe, 0.0);
                    stats.claimed += 1;
                    accepted.push(probe);
                    last = Some(outcome);
                }
            }
        }
        last
    }

    /// Picks the next scan center among the head or tail points of cluster `id`.
    fn continuation(&mut self, grid: &ChargeGrid, clusters: &ClusterSet, id: ClusterId) -> Option<CellIndex> {
        let cluster = clusters.get(id)?;
        let n = cluster.len();
        if n == 0 {
            return None;
        }

        let head = self.rng.gen::<f64>() > 0.5;
        let pos = continuation_index(n, head, self.rng.gen::<f64>());

        let point = &cluster.points()[pos];
        debug!("cluster {}: continuing from point {} of {} (cell {})", id, pos, n, point.cell);
        grid.cell_index(point.cell)
    }
}

/// Position in a cluster of `n > 0` points to continue from, given a uniform draw `u` in [0, 1).
///
/// Head: `min(floor(5u), n - 1)`. Tail: `max(0, n - 5u - 1)`, truncated.
fn continuation_index(n: usize, head: bool, u: f64) -> usize {
    if head {
        ((CONTINUATION_SPAN * u) as usize).min(n - 1)
    } else {
        (n as f64 - CONTINUATION_SPAN * u - 1.0).max(0.0) as usize
    }
}
