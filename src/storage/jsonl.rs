//! JSONL filesystem sink.
//!
//! Writes four append-only files under an output directory:
//! `zones.jsonl`, `cleaned_trips.jsonl`, `flagged_trips.jsonl`, and
//! `quality_log.jsonl`. Each batch is serialized fully in memory before
//! any byte is appended, so a serialization failure leaves the files
//! untouched and an IO failure surfaces as a fatal storage error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StorageError;
use crate::zones::ZoneRecord;

use super::{RecordBatch, RecordSink};

/// Append-only JSONL sink rooted at an output directory.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    dir: PathBuf,
}

impl JsonlSink {
    /// Creates the output directory and returns a sink rooted there.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::OpenFailed {
                path: dir.clone(),
                message: err.to_string(),
            })?;
        Ok(Self { dir })
    }

    /// Path of one of the four output files.
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Serializes records to one newline-delimited buffer.
    fn serialize_lines<T: Serialize>(records: &[T]) -> Result<Vec<u8>, StorageError> {
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }
        Ok(buffer)
    }

    /// Appends a pre-serialized buffer to a file.
    async fn append(&self, path: &Path, buffer: &[u8]) -> Result<(), StorageError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn write_zones(&self, zones: &[ZoneRecord]) -> Result<(), StorageError> {
        let buffer = Self::serialize_lines(zones)?;
        self.append(&self.path("zones.jsonl"), &buffer).await?;
        debug!(zones = zones.len(), "zone dimension persisted");
        Ok(())
    }

    async fn write_batch(&self, batch: &RecordBatch) -> Result<(), StorageError> {
        // Serialize everything first: a bad record must not leave a
        // half-applied batch behind.
        let cleaned = Self::serialize_lines(&batch.cleaned)?;
        let flagged = Self::serialize_lines(&batch.flagged)?;
        let log = Self::serialize_lines(&batch.log)?;

        self.append(&self.path("cleaned_trips.jsonl"), &cleaned)
            .await?;
        self.append(&self.path("flagged_trips.jsonl"), &flagged)
            .await?;
        self.append(&self.path("quality_log.jsonl"), &log).await?;

        debug!(
            cleaned = batch.cleaned.len(),
            flagged = batch.flagged.len(),
            log = batch.log.len(),
            "batch flushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Dataset, IssueType, LogAction, QualityLogEntry};
    use crate::zones::{MapStatus, ZoneRecord};

    fn zone(id: u32) -> ZoneRecord {
        ZoneRecord {
            location_id: id,
            borough: "Queens".to_string(),
            zone: "Astoria".to_string(),
            service_zone: "Boro Zone".to_string(),
            has_geometry: true,
            geometry_record_count: 1,
            map_status: MapStatus::Mappable,
        }
    }

    #[tokio::test]
    async fn test_zones_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::create(dir.path().join("out")).await.unwrap();

        sink.write_zones(&[zone(1), zone(2)]).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path("zones.jsonl"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ZoneRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.location_id, 1);
        assert_eq!(first.map_status, MapStatus::Mappable);
    }

    #[tokio::test]
    async fn test_batches_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::create(dir.path().join("out")).await.unwrap();

        let entry = QualityLogEntry::new(
            Dataset::Trips,
            "trips.csv:1",
            IssueType::DuplicateTrip,
            LogAction::Excluded,
            "natural key already seen this run",
        );
        let batch = RecordBatch {
            cleaned: vec![],
            flagged: vec![],
            log: vec![entry],
        };

        sink.write_batch(&batch).await.unwrap();
        sink.write_batch(&batch).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path("quality_log.jsonl"))
            .await
            .unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("DUPLICATE_TRIP"));
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::create(dir.path().join("out")).await.unwrap();

        sink.write_batch(&RecordBatch::default()).await.unwrap();
        assert!(!sink.path("cleaned_trips.jsonl").exists());
    }
}
