//! Persistence collaborators.
//!
//! The pipeline core only knows the [`RecordSink`] trait: zones once per
//! run, then cleaned/flagged/log batches. A batch write either fully
//! succeeds or fails the run — no partial batch is ever applied.

mod jsonl;
mod memory;

use async_trait::async_trait;

use crate::audit::QualityLogEntry;
use crate::error::StorageError;
use crate::quality::{CleanedTripRecord, FlaggedTripRecord};
use crate::zones::ZoneRecord;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

/// One flush unit of pipeline output.
#[derive(Debug, Default)]
pub struct RecordBatch {
    pub cleaned: Vec<CleanedTripRecord>,
    pub flagged: Vec<FlaggedTripRecord>,
    pub log: Vec<QualityLogEntry>,
}

impl RecordBatch {
    /// True when the batch holds nothing to flush.
    pub fn is_empty(&self) -> bool {
        self.cleaned.is_empty() && self.flagged.is_empty() && self.log.is_empty()
    }

    /// Moves the accumulated contents out, leaving the batch empty.
    pub fn take(&mut self) -> RecordBatch {
        std::mem::take(self)
    }
}

/// Batch-insert contract the orchestrator persists through.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persists the finished zone dimension. Called once, before any trip
    /// batch.
    async fn write_zones(&self, zones: &[ZoneRecord]) -> Result<(), StorageError>;

    /// Persists one batch atomically.
    async fn write_batch(&self, batch: &RecordBatch) -> Result<(), StorageError>;
}
