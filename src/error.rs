//! Error types shared across subsystems.
//!
//! Per-row data problems are never surfaced as errors — they become
//! [`crate::audit::QualityLogEntry`] writes and the run continues. The
//! enums here cover the failures that are allowed to abort a run: input
//! files that are missing or structurally unreadable, and persistence
//! failures during a batch flush.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the input readers. All of these are fatal: they fire
/// before or instead of row-level processing, never for a single bad field.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in '{path}': {message}")]
    MalformedCsv { path: PathBuf, message: String },

    #[error("Input file '{0}' has no header row")]
    MissingHeader(PathBuf),
}

/// Errors raised by persistence sinks. A failed batch flush is fatal for
/// the run; no partial batch is ever applied.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open sink at '{path}': {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
