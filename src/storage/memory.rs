//! In-memory sink for tests and single-process queries.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::audit::QualityLogEntry;
use crate::error::StorageError;
use crate::quality::{CleanedTripRecord, FlaggedTripRecord};
use crate::zones::ZoneRecord;

use super::{RecordBatch, RecordSink};

#[derive(Debug, Default)]
struct State {
    zones: Vec<ZoneRecord>,
    cleaned: Vec<CleanedTripRecord>,
    flagged: Vec<FlaggedTripRecord>,
    log: Vec<QualityLogEntry>,
}

/// Collects everything written to it. Useful for assertions and for the
/// ranking path, which needs the cleaned records back in memory anyway.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<State>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zones written so far.
    pub async fn zones(&self) -> Vec<ZoneRecord> {
        self.state.lock().await.zones.clone()
    }

    /// Cleaned records written so far, across all batches.
    pub async fn cleaned(&self) -> Vec<CleanedTripRecord> {
        self.state.lock().await.cleaned.clone()
    }

    /// Flag records written so far.
    pub async fn flagged(&self) -> Vec<FlaggedTripRecord> {
        self.state.lock().await.flagged.clone()
    }

    /// Audit entries written so far.
    pub async fn log(&self) -> Vec<QualityLogEntry> {
        self.state.lock().await.log.clone()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write_zones(&self, zones: &[ZoneRecord]) -> Result<(), StorageError> {
        self.state.lock().await.zones.extend_from_slice(zones);
        Ok(())
    }

    async fn write_batch(&self, batch: &RecordBatch) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.cleaned.extend_from_slice(&batch.cleaned);
        state.flagged.extend_from_slice(&batch.flagged);
        state.log.extend_from_slice(&batch.log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Dataset, IssueType, LogAction};

    #[tokio::test]
    async fn test_batches_accumulate() {
        let sink = MemorySink::new();
        let batch = RecordBatch {
            cleaned: vec![],
            flagged: vec![],
            log: vec![QualityLogEntry::new(
                Dataset::Trips,
                "trips.csv:1",
                IssueType::TripExcluded,
                LogAction::Excluded,
                "missing fare amount",
            )],
        };

        sink.write_batch(&batch).await.unwrap();
        sink.write_batch(&batch).await.unwrap();

        assert_eq!(sink.log().await.len(), 2);
        assert!(sink.cleaned().await.is_empty());
    }
}
