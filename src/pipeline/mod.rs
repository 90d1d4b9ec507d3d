//! Pipeline orchestration.
//!
//! Wires the zone reconciler, the trip quality engine, and a persistence
//! sink into one single-pass run with bounded output batches.
//!
//! # Pipeline Flow
//!
//! 1. Open every required input (missing files abort with nothing written)
//! 2. Reconcile the zone reference datasets into the zone dimension
//! 3. Persist the zone dimension and its audit entries
//! 4. Stream raw trip rows through the quality engine, one at a time
//! 5. Flush cleaned/flagged/log batches at the configured size
//! 6. Flush the final partial batch and report the run summary

mod config;
mod orchestrator;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{PipelineError, PipelineOrchestrator, RunInputs, RunSummary};
