use std::fmt;
use std::fmt::{Display, Formatter};

use log::{info, warn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use qgrid::constants::electrons_from_energy;
use qgrid::{Axis, CellIndex, ChargeGrid, ReadoutError, Result};

use crate::cluster::cluster::{Cluster, ClusterId};
use crate::cluster::engine::{ClusterEngine, EngineStats};
use crate::cluster::query::{self, ClusterSummary};
use crate::cluster::registry::ClusterSet;
use crate::data::config::ReadoutConfig;
use crate::data::correction::{apply_suppression_and_correction, CorrectionReport, LifetimeModel};

/// A packet of charge produced upstream (diffusion / geometry stage).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargeDeposit {
    pub position: [f64; 3],
    pub charge: f64,
}

impl ChargeDeposit {
    pub fn new(position: [f64; 3], charge: f64) -> Self {
        ChargeDeposit { position, charge }
    }
}

/// Charge readout of one event.
///
/// Owns the charge grid (and through it the axes) and the clusters reconstructed from it.
/// Typical use: record deposits, apply suppression and lifetime correction once, run
/// `clustering`, then query the clusters. `reset_event` prepares the readout for the
/// next event.
pub struct Readout {
    event: u32,
    grid: ChargeGrid,
    clusters: ClusterSet,
    config: ReadoutConfig,
    engine: ClusterEngine<StdRng>,
    correction_passes: usize,
    last_stats: EngineStats,
}

impl Readout {
    /// Constructs an empty readout.
    ///
    /// # Arguments
    ///
    /// * `event` - Event number.
    /// * `axes` - Drift, transverse-1 and transverse-2 axes, in that order.
    /// * `config` - Tunable constants; rejected with `InvalidConfig` if inconsistent.
    ///
    pub fn new(event: u32, axes: [Axis; 3], config: ReadoutConfig) -> Result<Self> {
        Readout::from_parts(event, ChargeGrid::new(axes)?, Vec::new(), config)
    }

    /// Readout sourcing a copy of an externally filled grid.
    pub fn from_grid(event: u32, grid: &ChargeGrid, config: ReadoutConfig) -> Result<Self> {
        Readout::from_parts(event, grid.clone(), Vec::new(), config)
    }

    /// Readout rebuilt from a grid and clusters produced earlier, e.g. when loading from disk.
    pub fn from_parts(event: u32, grid: ChargeGrid, clusters: Vec<Cluster>, config: ReadoutConfig) -> Result<Self> {
        config.validate()?;
        for axis in grid.axes() {
            axis.validate()?;
        }
        Ok(Readout {
            event,
            grid,
            clusters: ClusterSet::from_clusters(clusters, config.max_link_distance),
            engine: ClusterEngine::from_config(&config),
            config,
            correction_passes: 0,
            last_stats: EngineStats::default(),
        })
    }

    pub fn event_number(&self) -> u32 {
        self.event
    }

    pub fn set_event_number(&mut self, event: u32) {
        self.event = event;
    }

    pub fn config(&self) -> &ReadoutConfig {
        &self.config
    }

    pub fn grid(&self) -> &ChargeGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut ChargeGrid {
        &mut self.grid
    }

    /// Adds a charge packet to the grid; positions outside the grid are dropped.
    pub fn record(&mut self, position: [f64; 3], charge: f64) -> Option<CellIndex> {
        self.grid.fill(position, charge)
    }

    /// Records an energy deposit (MeV) as its number of ionization electrons.
    pub fn record_energy(&mut self, position: [f64; 3], energy_mev: f64) -> Option<CellIndex> {
        self.grid.fill(position, electrons_from_energy(energy_mev))
    }

    /// Records a stream of deposits, returning how many landed inside the grid.
    pub fn record_deposits<I>(&mut self, deposits: I) -> usize
    where
        I: IntoIterator<Item = ChargeDeposit>,
    {
        deposits
            .into_iter()
            .filter_map(|d| self.grid.fill(d.position, d.charge))
            .count()
    }

    /// Suppresses cells below `threshold` and lifetime-corrects the rest.
    ///
    /// Meant to run once per event. A second call corrects the charge again
    /// (the factors compound); it is logged but not prevented.
    pub fn apply_suppression_and_correction(&mut self, threshold: f64) -> CorrectionReport {
        if self.correction_passes > 0 {
            warn!(
                "event {}: lifetime correction applied {} time(s) already, charge will be corrected again",
                self.event, self.correction_passes
            );
        }
        self.correction_passes += 1;
        apply_suppression_and_correction(&mut self.grid, threshold, &LifetimeModel::from_config(&self.config))
    }

    /// Same as `apply_suppression_and_correction` with the configured noise threshold.
    pub fn apply_default_suppression(&mut self) -> CorrectionReport {
        self.apply_suppression_and_correction(self.config.noise_threshold)
    }

    pub fn correction_passes(&self) -> usize {
        self.correction_passes
    }

    /// Clusters the charge of the grid and returns the number of clusters held.
    ///
    /// The grid range is first narrowed to the bounding box of the charge; the engine
    /// then consumes a working copy, leaving the readout's grid untouched. Calling this
    /// again appends to the existing clusters, already claimed cells are not counted twice.
    pub fn clustering(&mut self) -> usize {
        self.grid
            .narrow_to_populated_range(self.config.range_threshold, self.config.range_margin_bins);
        let mut working = self.grid.clone();
        self.last_stats = self.engine.run(&mut working, &mut self.clusters);
        info!(
            "event {}: {} clusters, total charge {:.1}",
            self.event,
            self.clusters.len(),
            self.total_charge()
        );
        self.clusters.len()
    }

    /// Counters of the last `clustering` call.
    pub fn last_stats(&self) -> EngineStats {
        self.last_stats
    }

    pub fn clusters(&self) -> &[Cluster] {
        self.clusters.clusters()
    }

    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters.get(id).ok_or(ReadoutError::UnknownCluster(id))
    }

    pub fn total_charge(&self) -> f64 {
        query::total_charge(self.clusters.clusters())
    }

    pub fn max_cluster(&self) -> Result<&Cluster> {
        query::max_cluster(self.clusters.clusters())
    }

    /// Grid holding only the points of `cluster`, with this readout's axes.
    pub fn materialize(&self, cluster: &Cluster) -> ChargeGrid {
        query::materialize(cluster, &self.grid)
    }

    pub fn max_cluster_grid(&self) -> Result<ChargeGrid> {
        Ok(self.materialize(self.max_cluster()?))
    }

    pub fn cluster_grids(&self) -> Vec<ChargeGrid> {
        query::materialize_all(self.clusters.clusters(), &self.grid)
    }

    pub fn summary(&self) -> Vec<ClusterSummary> {
        query::summarize(self.clusters.clusters())
    }

    /// Drops clusters and grid content so the readout can take the next event.
    pub fn reset_event(&mut self) {
        self.clusters.clear();
        self.grid.reset();
        self.correction_passes = 0;
        self.last_stats = EngineStats::default();
    }
}

impl Display for Readout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Readout(event: {}, populated cells: {}, clusters: {}, total charge: {:.1})",
            self.event,
            self.grid.populated_len(),
            self.clusters.len(),
            self.total_charge()
        )
    }
}
