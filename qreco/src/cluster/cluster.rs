use nalgebra::Point3;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use qgrid::CellId;

/// Numeric identifier of a cluster, increasing from 0 within one readout.
pub type ClusterId = u64;

/// One claimed grid cell: its bin-center position, its key in the owning grid and its charge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub position: Point3<f64>,
    pub cell: CellId,
    pub charge: f64,
}

impl ClusterPoint {
    pub fn new(position: Point3<f64>, cell: CellId, charge: f64) -> Self {
        ClusterPoint { position, cell, charge }
    }

    #[inline]
    pub fn distance_squared(&self, other: &ClusterPoint) -> f64 {
        nalgebra::distance_squared(&self.position, &other.position)
    }
}

/// Accumulating set of charge-weighted points.
///
/// Points are kept in insertion order. The running charge always equals the sum of
/// the point charges, and the membership set mirrors the cell ids of `points`.
#[derive(Clone, Debug)]
pub struct Cluster {
    id: ClusterId,
    charge: f64,
    points: Vec<ClusterPoint>,
    members: FxHashSet<CellId>,
}

impl Cluster {
    pub fn new(id: ClusterId) -> Self {
        Cluster {
            id,
            charge: 0.0,
            points: Vec::new(),
            members: FxHashSet::default(),
        }
    }

    /// Rebuilds a cluster from stored points, recomputing charge and membership.
    pub fn from_points(id: ClusterId, points: Vec<ClusterPoint>) -> Self {
        let mut cluster = Cluster::new(id);
        for point in points {
            cluster.register_point(point);
        }
        cluster
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn points(&self) -> &[ClusterPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn is_registered(&self, cell: CellId) -> bool {
        self.members.contains(&cell)
    }

    pub fn register_point(&mut self, point: ClusterPoint) {
        self.charge += point.charge;
        self.members.insert(point.cell);
        self.points.push(point);
    }

    /// True if any point of the cluster lies within `max_distance` of `point`.
    pub fn is_linked(&self, point: &ClusterPoint, max_distance: f64) -> bool {
        let d2 = max_distance * max_distance;
        self.points.iter().any(|p| p.distance_squared(point) <= d2)
    }

    /// Charge-weighted barycenter, `None` for an empty or zero-charge cluster.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() || self.charge == 0.0 {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.position.coords * p.charge);
        Some(Point3::from(sum / self.charge))
    }
}
