pub mod cluster;
pub mod registry;
pub mod engine;
pub mod query;

// Re-export commonly used types
pub use query::{materialize, materialize_all, max_cluster, summarize, total_charge, ClusterSummary};
