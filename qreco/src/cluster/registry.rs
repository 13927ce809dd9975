//! Cluster registry: decides which cluster a newly claimed cell joins.

use log::debug;

use crate::cluster::cluster::{Cluster, ClusterId, ClusterPoint};

/// Result of offering a point to the registry.
///
/// Only `Created` and `Merged` carry an id; a point whose cell is already a member of
/// some cluster is reported as `AlreadyPresent` and never registered twice.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClusterOutcome {
    Created(ClusterId),
    Merged(ClusterId),
    AlreadyPresent,
}

impl ClusterOutcome {
    #[inline]
    pub fn cluster_id(&self) -> Option<ClusterId> {
        match self {
            ClusterOutcome::Created(id) | ClusterOutcome::Merged(id) => Some(*id),
            ClusterOutcome::AlreadyPresent => None,
        }
    }
}

/// Ordered list of clusters plus the linking rule used to grow them.
#[derive(Clone, Debug)]
pub struct ClusterSet {
    clusters: Vec<Cluster>,
    max_link_distance: f64,
}

impl ClusterSet {
    pub fn new(max_link_distance: f64) -> Self {
        ClusterSet {
            clusters: Vec::with_capacity(20),
            max_link_distance,
        }
    }

    pub fn from_clusters(clusters: Vec<Cluster>, max_link_distance: f64) -> Self {
        ClusterSet { clusters, max_link_distance }
    }

    pub fn max_link_distance(&self) -> f64 {
        self.max_link_distance
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        // ids are handed out in order, so the position is the usual hit
        match self.clusters.get(id as usize) {
            Some(cl) if cl.id() == id => Some(cl),
            _ => self.clusters.iter().find(|cl| cl.id() == id),
        }
    }

    pub fn clear(&mut self) {
        self.clusters.clear();
    }

    pub fn into_vec(self) -> Vec<Cluster> {
        self.clusters
    }

    /// Assigns `point` to a cluster.
    ///
    /// A cell already registered anywhere yields `AlreadyPresent`. Otherwise the point
    /// joins the first cluster (in creation order) holding a point within the maximum
    /// link distance, or opens a new cluster with id `highest + 1` (0 for the first).
    ///
    /// Every existing point is compared, so the cost grows with the number of
    /// registered points.
    pub fn find_cluster(&mut self, point: ClusterPoint) -> ClusterOutcome {
        if self.clusters.iter().any(|cl| cl.is_registered(point.cell)) {
            debug!("cell {} is already registered", point.cell);
            return ClusterOutcome::AlreadyPresent;
        }

        let dmax = self.max_link_distance;
        if let Some(cl) = self.clusters.iter_mut().find(|cl| cl.is_linked(&point, dmax))
        {
            cl.register_point(point);
            return ClusterOutcome::Merged(cl.id());
        }

        let id = self.clusters.iter().map(|cl| cl.id() + 1).max().unwrap_or(0);
        debug!("creating cluster {} for cell {}", id, point.cell);
        let mut cl = Cluster::new(id);
        cl.register_point(point);
        self.clusters.push(cl);
        ClusterOutcome::Created(id)
    }
}
