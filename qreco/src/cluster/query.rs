//! Aggregate queries over a list of clusters.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use qgrid::{ChargeGrid, ReadoutError, Result};

use crate::cluster::cluster::{Cluster, ClusterId};

/// Sum of the charge of every cluster; 0 for an empty list.
pub fn total_charge(clusters: &[Cluster]) -> f64 {
    clusters.iter().map(|cl| cl.charge()).sum()
}

/// Cluster with the largest charge; ties go to the earliest cluster.
pub fn max_cluster(clusters: &[Cluster]) -> Result<&Cluster> {
    let mut iter = clusters.iter();
    let first = iter.next().ok_or(ReadoutError::NoClusters)?;
    Ok(iter.fold(first, |best, cl| if cl.charge() > best.charge() { cl } else { best }))
}

/// Replays the points of `cluster` into an empty grid with the axes of `template`.
pub fn materialize(cluster: &Cluster, template: &ChargeGrid) -> ChargeGrid {
    let mut grid = template.empty_like();
    for point in cluster.points() {
        grid.fill([point.position.x, point.position.y, point.position.z], point.charge);
    }
    grid
}

/// One grid per cluster, in cluster order.
pub fn materialize_all(clusters: &[Cluster], template: &ChargeGrid) -> Vec<ChargeGrid> {
    clusters.par_iter().map(|cl| materialize(cl, template)).collect()
}

/// Compact per-cluster figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub n_points: usize,
    pub charge: f64,
    pub centroid: Option<[f64; 3]>,
}

pub fn summarize(clusters: &[Cluster]) -> Vec<ClusterSummary> {
    clusters
        .iter()
        .map(|cl| ClusterSummary {
            id: cl.id(),
            n_points: cl.len(),
            charge: cl.charge(),
            centroid: cl.centroid().map(|c| [c.x, c.y, c.z]),
        })
        .collect()
}
