// src/lib.rs
pub mod data {
    pub mod config;
    pub mod correction;
    pub mod readout;
    pub mod io;
}

pub mod cluster;

// Re-export commonly used types
pub use cluster::cluster::{Cluster, ClusterId, ClusterPoint};
pub use cluster::engine::{ClusterEngine, EngineStats};
pub use cluster::query::ClusterSummary;
pub use cluster::registry::{ClusterOutcome, ClusterSet};
pub use data::config::{Exploration, ReadoutConfig};
pub use data::correction::CorrectionReport;
pub use data::io::ReadoutFile;
pub use data::readout::{ChargeDeposit, Readout};
pub use qgrid::{Axis, AxisKind, CellId, CellIndex, ChargeGrid, ReadoutError, Result};
