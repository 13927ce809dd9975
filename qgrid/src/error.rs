//! Error types shared by the readout crates.

use thiserror::Error;

/// Unified error type for grid construction, clustering queries and persistence.
#[derive(Error, Debug)]
pub enum ReadoutError {
    /// Axis definition rejected at construction time.
    #[error("invalid axis '{title}': {reason}")]
    InvalidAxis { title: String, reason: String },

    /// Axis position outside of the three grid dimensions.
    #[error("axis index {0} out of range, a charge grid has 3 axes")]
    AxisIndex(usize),

    /// Tunable constants that cannot drive a readout.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query that needs at least one cluster.
    #[error("no clusters available")]
    NoClusters,

    /// Cluster id that does not belong to this readout.
    #[error("unknown cluster id {0}")]
    UnknownCluster(u64),

    /// Stored readout written by an incompatible format version.
    #[error("unsupported readout file version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("binary decoding error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl ReadoutError {
    /// Creates an axis error.
    pub fn axis(title: impl Into<String>, reason: impl Into<String>) -> Self {
        ReadoutError::InvalidAxis {
            title: title.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ReadoutError::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ReadoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = ReadoutError::axis("time", "pitch must be positive");
        assert_eq!(e.to_string(), "invalid axis 'time': pitch must be positive");
        assert_eq!(ReadoutError::NoClusters.to_string(), "no clusters available");
        assert_eq!(ReadoutError::UnknownCluster(7).to_string(), "unknown cluster id 7");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: ReadoutError = io.into();
        assert!(matches!(e, ReadoutError::Io(_)));
    }
}
