//! Pipeline orchestration: zone reconciliation, trip ingestion, and
//! batched persistence.
//!
//! Ingestion is one logical pass. A row's full quality pipeline completes
//! before the next row is read, and output accumulates into bounded
//! batches, so memory stays at O(batch size) plus the run-global dedup key
//! set. Every required input is opened before the first persistence write:
//! a missing file aborts the run with nothing committed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::RecordCounts;
use crate::error::{IngestError, StorageError};
use crate::ingest::{read_zone_geometry, read_zone_lookup, TripRowReader};
use crate::quality::{RunContext, TripQualityEngine};
use crate::storage::{RecordBatch, RecordSink};
use crate::zones::{ReconcileSummary, ZoneReconciler};

use super::config::{ConfigError, PipelineConfig};

/// Errors that can abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A required input is missing or unreadable.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// A batch flush failed; the run stops before any further writes.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Input files for one run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    /// Zone name lookup CSV.
    pub zone_lookup: PathBuf,
    /// Zone geometry metadata CSV.
    pub zone_geometry: PathBuf,
    /// Raw trip CSVs, processed in order.
    pub trips: Vec<PathBuf>,
}

/// Operator-facing result of a completed run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    /// Identifies the run in logs and persisted output.
    pub run_id: Uuid,
    /// Trip counts: raw, excluded, duplicates, flagged, clean.
    #[serde(flatten)]
    pub counts: RecordCounts,
    /// Zone reconciliation counts.
    pub zones: ReconcileSummary,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

/// Coordinates one full ingestion run.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    sink: Arc<dyn RecordSink>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator. The configuration is validated here so a
    /// bad setup fails before any input is touched.
    pub fn new(config: PipelineConfig, sink: Arc<dyn RecordSink>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    /// Runs the full pipeline: reconcile zones, stream trips through the
    /// quality engine, persist batches, and return the run summary.
    pub async fn run(&self, inputs: RunInputs) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        // Read and open every required input before the first write.
        let lookup_rows = read_zone_lookup(&inputs.zone_lookup)?;
        let geometry_rows = read_zone_geometry(&inputs.zone_geometry)?;
        let mut trip_readers = Vec::with_capacity(inputs.trips.len());
        for path in &inputs.trips {
            trip_readers.push(TripRowReader::open(path)?);
        }

        let outcome = ZoneReconciler::new().reconcile(lookup_rows, geometry_rows);
        self.sink.write_zones(outcome.dimension.records()).await?;

        // Zone issues lead the audit log.
        let mut batch = RecordBatch {
            log: outcome.issues,
            ..RecordBatch::default()
        };

        let engine = TripQualityEngine::new(
            Arc::new(outcome.dimension),
            self.config.thresholds,
        );
        let mut ctx = RunContext::new();
        info!(run_id = %ctx.run_id, trip_files = trip_readers.len(), "ingestion started");

        for reader in trip_readers {
            for row in reader {
                let row = row?;
                let row_outcome = engine.process(&row, &mut ctx);

                batch.cleaned.extend(row_outcome.cleaned);
                batch.flagged.extend(row_outcome.flags);
                batch.log.extend(row_outcome.log);

                if batch.cleaned.len() >= self.config.batch_size
                    || batch.log.len() >= self.config.batch_size
                {
                    self.flush(&mut batch).await?;
                }
            }
        }

        // Last partial batch.
        self.flush(&mut batch).await?;

        let summary = RunSummary {
            run_id: ctx.run_id,
            counts: ctx.counts,
            zones: outcome.summary,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            run_id = %summary.run_id,
            total_raw = summary.counts.total_raw,
            excluded = summary.counts.excluded,
            duplicates = summary.counts.duplicates,
            flagged = summary.counts.flagged,
            clean = summary.counts.clean,
            distinct_keys = ctx.distinct_keys(),
            "ingestion complete"
        );
        Ok(summary)
    }

    /// Flushes the accumulated batch as one atomic unit.
    async fn flush(&self, batch: &mut RecordBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let full = batch.take();
        if let Err(err) = self.sink.write_batch(&full).await {
            error!(%err, "batch flush failed; aborting run");
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySink;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn fixture_inputs(dir: &tempfile::TempDir) -> RunInputs {
        let zone_lookup = write_file(
            dir,
            "zones.csv",
            "LocationID,Borough,Zone,service_zone\n\
             41,Manhattan,Central Harlem,Boro Zone\n\
             24,Manhattan,Bloomingdale,Yellow Zone\n",
        );
        let zone_geometry = write_file(
            dir,
            "geometry.csv",
            "location_id,borough,zone,service_zone\n\
             41,Manhattan,Central Harlem,Boro Zone\n",
        );
        let trips = write_file(
            dir,
            "trips.csv",
            "tpep_pickup_datetime,tpep_dropoff_datetime,PULocationID,DOLocationID,passenger_count,trip_distance,fare_amount,tip_amount,total_amount\n\
             2019-01-01 08:00:00,2019-01-01 08:15:00,41,24,1,3.0,12.50,2.00,15.80\n\
             2019-01-01 08:00:00,2019-01-01 08:15:00,41,24,1,3.0,12.50,2.00,15.80\n\
             2019-01-01 09:00:00,2019-01-01 08:59:00,41,24,1,1.0,5.00,0.00,6.00\n",
        );
        RunInputs {
            zone_lookup,
            zone_geometry,
            trips: vec![trips],
        }
    }

    #[tokio::test]
    async fn test_full_run_counts_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            sink.clone() as Arc<dyn RecordSink>,
        )
        .unwrap();

        let summary = orchestrator.run(fixture_inputs(&dir)).await.unwrap();

        assert_eq!(summary.counts.total_raw, 3);
        assert_eq!(summary.counts.clean, 1);
        assert_eq!(summary.counts.duplicates, 1);
        assert_eq!(summary.counts.excluded, 1);
        assert_eq!(summary.zones.zones_out, 2);

        assert_eq!(sink.zones().await.len(), 2);
        assert_eq!(sink.cleaned().await.len(), 1);
        // One missing-geometry entry, one duplicate trip, one exclusion.
        assert_eq!(sink.log().await.len(), 3);
    }

    #[tokio::test]
    async fn test_small_batch_size_flushes_incrementally() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default().with_batch_size(1),
            sink.clone() as Arc<dyn RecordSink>,
        )
        .unwrap();

        let summary = orchestrator.run(fixture_inputs(&dir)).await.unwrap();
        assert_eq!(summary.counts.total_raw, 3);
        assert_eq!(sink.cleaned().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_trip_file_aborts_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            sink.clone() as Arc<dyn RecordSink>,
        )
        .unwrap();

        let mut inputs = fixture_inputs(&dir);
        inputs.trips.push(dir.path().join("does-not-exist.csv"));

        let err = orchestrator.run(inputs).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ingest(_)));
        assert!(sink.zones().await.is_empty());
        assert!(sink.log().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let sink = Arc::new(MemorySink::new());
        let result = PipelineOrchestrator::new(
            PipelineConfig::default().with_batch_size(0),
            sink as Arc<dyn RecordSink>,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
