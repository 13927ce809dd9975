//! Persistence of a reconstructed readout.
//!
//! A [`ReadoutFile`] flattens the grid content and the clusters of one event into plain
//! records. It can be written as pretty JSON or as compact bincode.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bincode::{Decode, Encode};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use qgrid::{Axis, CellId, CellIndex, ChargeGrid, ReadoutError, Result};

use crate::cluster::cluster::{Cluster, ClusterId, ClusterPoint};
use crate::data::config::ReadoutConfig;
use crate::data::readout::Readout;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CellRecord {
    pub index: [usize; 3],
    pub charge: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PointRecord {
    pub position: [f64; 3],
    pub cell: u64,
    pub charge: f64,
}

impl From<&ClusterPoint> for PointRecord {
    fn from(p: &ClusterPoint) -> Self {
        PointRecord {
            position: [p.position.x, p.position.y, p.position.z],
            cell: p.cell.0,
            charge: p.charge,
        }
    }
}

impl From<PointRecord> for ClusterPoint {
    fn from(r: PointRecord) -> Self {
        let [x, y, z] = r.position;
        ClusterPoint::new(Point3::new(x, y, z), CellId(r.cell), r.charge)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub points: Vec<PointRecord>,
}

/// Stored form of one event: axes, populated cells (ascending cell id) and clusters.
///
/// The running cluster charge is not stored, it is rebuilt from the points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ReadoutFile {
    pub version: u32,
    pub event: u32,
    pub axes: Vec<Axis>,
    pub cells: Vec<CellRecord>,
    pub clusters: Vec<ClusterRecord>,
}

impl ReadoutFile {
    pub fn from_readout(readout: &Readout) -> Self {
        let grid = readout.grid();
        let mut cells: Vec<(CellIndex, f64)> = grid.cells().collect();
        cells.sort_unstable_by_key(|(idx, _)| grid.cell_id(*idx));

        ReadoutFile {
            version: FORMAT_VERSION,
            event: readout.event_number(),
            axes: grid.axes().to_vec(),
            cells: cells
                .into_iter()
                .map(|(index, charge)| CellRecord { index, charge })
                .collect(),
            clusters: readout
                .clusters()
                .iter()
                .map(|cl| ClusterRecord {
                    id: cl.id(),
                    points: cl.points().iter().map(PointRecord::from).collect(),
                })
                .collect(),
        }
    }

    /// Rebuilds a readout driven by `config`.
    pub fn into_readout(self, config: ReadoutConfig) -> Result<Readout> {
        if self.version != FORMAT_VERSION {
            return Err(ReadoutError::UnsupportedVersion {
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }

        let n_axes = self.axes.len();
        let axes: [Axis; 3] = self
            .axes
            .try_into()
            .map_err(|_| ReadoutError::config(format!("a readout file holds 3 axes, found {}", n_axes)))?;
        for axis in &axes {
            axis.validate()?;
        }

        let mut grid = ChargeGrid::new(axes)?;
        for cell in self.cells {
            if !grid.contains_index(cell.index) {
                return Err(ReadoutError::config(format!("stored cell {:?} lies outside the grid", cell.index)));
            }
            grid.set(cell.index, cell.charge);
        }

        let clusters = self
            .clusters
            .into_iter()
            .map(|rec| Cluster::from_points(rec.id, rec.points.into_iter().map(ClusterPoint::from).collect()))
            .collect();

        Readout::from_parts(self.event, grid, clusters, config)
    }
}

// --- JSON (human-readable) ---
pub fn save_json<P: AsRef<Path>>(path: P, readout: &Readout) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, &ReadoutFile::from_readout(readout))?;
    writer.flush()?;
    debug!("event {} written to {}", readout.event_number(), path.as_ref().display());
    Ok(())
}

pub fn load_json<P: AsRef<Path>>(path: P, config: ReadoutConfig) -> Result<Readout> {
    let reader = BufReader::new(File::open(path)?);
    let file: ReadoutFile = serde_json::from_reader(reader)?;
    file.into_readout(config)
}

// --- Bincode ---
pub fn save_bincode<P: AsRef<Path>>(path: P, readout: &Readout) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let n = bincode::encode_into_std_write(ReadoutFile::from_readout(readout), &mut writer, bincode::config::standard())?;
    writer.flush()?;
    debug!("event {} written to {} ({} bytes)", readout.event_number(), path.as_ref().display(), n);
    Ok(())
}

pub fn load_bincode<P: AsRef<Path>>(path: P, config: ReadoutConfig) -> Result<Readout> {
    let mut reader = BufReader::new(File::open(path)?);
    let file: ReadoutFile = bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
    file.into_readout(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgrid::AxisKind;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("qreco-{}-{}", std::process::id(), name))
    }

    fn clustered_readout() -> Readout {
        let axes = [
            Axis::for_kind(AxisKind::Drift, 0.0, 50.0, 1.0).unwrap(),
            Axis::for_kind(AxisKind::T1, -25.0, 25.0, 0.5).unwrap(),
            Axis::for_kind(AxisKind::T2, -25.0, 25.0, 0.5).unwrap(),
        ];
        let mut ro = Readout::new(12, axes, ReadoutConfig::flood_fill()).unwrap();
        for i in 0..10 {
            ro.record([5.0 + i as f64, 0.1, 0.1], 2500.0);
            ro.record([40.5, -20.0 + 0.5 * i as f64, 10.0], 1800.0);
        }
        ro.clustering();
        ro
    }

    fn assert_same(a: &Readout, b: &Readout) {
        assert_eq!(a.event_number(), b.event_number());
        assert_eq!(a.grid().axes(), b.grid().axes());
        assert_eq!(a.grid().populated_cells(), b.grid().populated_cells());
        assert_eq!(a.clusters().len(), b.clusters().len());
        for (ca, cb) in a.clusters().iter().zip(b.clusters()) {
            assert_eq!(ca.id(), cb.id());
            assert_eq!(ca.points(), cb.points());
            assert!((ca.charge() - cb.charge()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_json_round_trip() {
        let ro = clustered_readout();
        assert_eq!(ro.clusters().len(), 2);

        let path = temp_path("event.json");
        save_json(&path, &ro).unwrap();
        let back = load_json(&path, ReadoutConfig::flood_fill()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_same(&ro, &back);
    }

    #[test]
    fn test_bincode_round_trip() {
        let ro = clustered_readout();
        let path = temp_path("event.bin");
        save_bincode(&path, &ro).unwrap();
        let back = load_bincode(&path, ReadoutConfig::flood_fill()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_same(&ro, &back);
    }

    #[test]
    fn test_rejects_wrong_version_and_axes() {
        let mut file = ReadoutFile::from_readout(&clustered_readout());
        file.version = 9;
        assert!(matches!(
            file.clone().into_readout(ReadoutConfig::default()),
            Err(ReadoutError::UnsupportedVersion { found: 9, expected: FORMAT_VERSION })
        ));

        file.version = FORMAT_VERSION;
        file.axes.pop();
        assert!(matches!(file.into_readout(ReadoutConfig::default()), Err(ReadoutError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file() {
        let path = temp_path("does-not-exist.json");
        assert!(matches!(load_json(&path, ReadoutConfig::default()), Err(ReadoutError::Io(_))));
    }
}
