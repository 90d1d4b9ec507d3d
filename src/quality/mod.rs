//! Trip quality and feature engine.
//!
//! Per-record validation, natural-key deduplication, hard exclusions,
//! null-guarded derived features, and multi-label soft-flag anomaly
//! detection — every decision audited.

mod anomaly;
mod dedup;
mod engine;
mod normalize;

pub use anomaly::{AnomalyDetector, AnomalyThresholds, AnomalyType, Severity};
pub use dedup::{NaturalKey, RunContext};
pub use engine::{
    CleanedTripRecord, FlaggedTripRecord, RowOutcome, TimeBucket, TripQualityEngine,
};
pub use normalize::{normalize, parse_timestamp, NormalizedTrip, RawTripRow};
