//! tripforge: trip data quality pipeline.
//!
//! Reconciles zone reference data into a canonical dimension, runs raw
//! trip records through a deterministic quality pipeline (validation,
//! natural-key dedup, hard exclusions, safe derived features, soft-flag
//! anomaly detection), and answers bounded top-k ranking queries.

// Core modules
pub mod audit;
pub mod cli;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod quality;
pub mod ranking;
pub mod storage;
pub mod zones;

// Re-export commonly used error types
pub use error::{IngestError, StorageError};
pub use pipeline::{ConfigError, PipelineError};
