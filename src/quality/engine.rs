//! The per-row trip quality pipeline.
//!
//! Every raw row goes through the same strict order: normalization,
//! natural-key duplicate detection, hard exclusions, derived-feature
//! computation, soft-flag evaluation. Rows never abort the run — every
//! decision is recorded as an audit entry and counted.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::audit::{Dataset, IssueType, LogAction, QualityLogEntry};
use crate::zones::ZoneDimension;

use super::anomaly::{AnomalyDetector, AnomalyThresholds, AnomalyType, Severity};
use super::dedup::{NaturalKey, RunContext};
use super::normalize::{normalize, NormalizedTrip, RawTripRow};

/// Coarse time-of-day label derived from the pickup hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    MorningRush,
    EveningRush,
    OffPeak,
}

impl TimeBucket {
    /// Buckets an hour of day: 7-9 morning rush, 16-18 evening rush,
    /// everything else off-peak.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            7..=9 => TimeBucket::MorningRush,
            16..=18 => TimeBucket::EveningRush,
            _ => TimeBucket::OffPeak,
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimeBucket::MorningRush => "morning_rush",
            TimeBucket::EveningRush => "evening_rush",
            TimeBucket::OffPeak => "off_peak",
        };
        write!(f, "{}", name)
    }
}

/// A trip that survived every hard-exclusion check, with derived features
/// and resolved zone labels. Immutable once created; `duration_min` is
/// always positive by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedTripRecord {
    pub record_key: String,
    pub source_file: String,
    pub source_row_num: u64,
    pub vendor_id: Option<String>,
    pub pickup_ts: NaiveDateTime,
    pub dropoff_ts: NaiveDateTime,
    pub passenger_count: Option<i64>,
    pub trip_distance: f64,
    pub rate_code_id: Option<i64>,
    pub store_and_fwd_flag: Option<String>,
    pub pu_location_id: u32,
    pub do_location_id: u32,
    pub payment_type: Option<i64>,
    pub fare_amount: f64,
    pub extra: Option<f64>,
    pub mta_tax: Option<f64>,
    pub tip_amount: Option<f64>,
    pub tolls_amount: Option<f64>,
    pub improvement_surcharge: Option<f64>,
    pub total_amount: f64,
    pub congestion_surcharge: Option<f64>,
    pub duration_min: f64,
    pub revenue_per_minute: Option<f64>,
    pub fare_per_mile: Option<f64>,
    pub avg_speed_mph: Option<f64>,
    pub tip_percentage: Option<f64>,
    pub pickup_hour: u32,
    pub pickup_date: NaiveDate,
    pub time_bucket: TimeBucket,
    pub pickup_borough: Option<String>,
    pub pickup_zone: Option<String>,
    pub dropoff_borough: Option<String>,
    pub dropoff_zone: Option<String>,
}

/// An anomaly annotation on a retained trip. A single cleaned trip may
/// carry zero, one, or several of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedTripRecord {
    /// `file:row` key of the flagged trip.
    pub record_key: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
}

/// What the engine decided about one raw row.
#[derive(Debug)]
pub struct RowOutcome {
    /// The cleaned record, when the row survived the hard checks.
    pub cleaned: Option<CleanedTripRecord>,
    /// Soft-flag annotations for the cleaned record.
    pub flags: Vec<FlaggedTripRecord>,
    /// Audit entries produced while processing the row.
    pub log: Vec<QualityLogEntry>,
}

/// Runs raw trip rows through validation, dedup, derivation, and flagging.
pub struct TripQualityEngine {
    zones: Arc<ZoneDimension>,
    detector: AnomalyDetector,
}

impl TripQualityEngine {
    /// Creates an engine joined against the given zone dimension.
    pub fn new(zones: Arc<ZoneDimension>, thresholds: AnomalyThresholds) -> Self {
        Self {
            zones,
            detector: AnomalyDetector::new(thresholds),
        }
    }

    /// Processes one raw row. Counters on `ctx` are updated; the returned
    /// outcome carries the record, flags, and log entries to batch up.
    pub fn process(&self, row: &RawTripRow, ctx: &mut RunContext) -> RowOutcome {
        let trip = normalize(row);
        let record_key = trip.record_key();
        let mut log = Vec::new();

        // Dedup runs before the hard checks: only the first arrival for a
        // natural key is eligible to continue.
        let key = NaturalKey::from_trip(&trip);
        if !ctx.first_arrival(key) {
            ctx.counts.record_duplicate();
            trace!(%record_key, "duplicate trip");
            log.push(QualityLogEntry::new(
                Dataset::Trips,
                record_key,
                IssueType::DuplicateTrip,
                LogAction::Excluded,
                "natural key already seen this run",
            ));
            return RowOutcome {
                cleaned: None,
                flags: Vec::new(),
                log,
            };
        }

        let required = match validate(&trip) {
            Ok(required) => required,
            Err(reasons) => {
                ctx.counts.record_excluded();
                log.push(QualityLogEntry::new(
                    Dataset::Trips,
                    record_key,
                    IssueType::TripExcluded,
                    LogAction::Excluded,
                    reasons.join("; "),
                ));
                return RowOutcome {
                    cleaned: None,
                    flags: Vec::new(),
                    log,
                };
            }
        };

        // The row survives, so any nulled optional value propagates to the
        // cleaned output; each such field leaves a trace. Required-field
        // parse failures never reach this point — they exclude the row and
        // are covered by the exclusion entry.
        for field in &trip.parse_failures {
            log.push(QualityLogEntry::new(
                Dataset::Trips,
                record_key.clone(),
                IssueType::UnparseableFieldValue,
                LogAction::Retained,
                format!("unparseable value for {field} treated as null"),
            ));
        }

        let cleaned = self.build_cleaned(trip, required);

        let flags: Vec<FlaggedTripRecord> = self
            .detector
            .evaluate(&cleaned)
            .into_iter()
            .map(|(anomaly_type, details)| {
                log.push(QualityLogEntry::new(
                    Dataset::Trips,
                    cleaned.record_key.clone(),
                    anomaly_type.into(),
                    LogAction::Flagged,
                    details,
                ));
                FlaggedTripRecord {
                    record_key: cleaned.record_key.clone(),
                    anomaly_type,
                    severity: Severity::Suspicious,
                }
            })
            .collect();

        ctx.counts.record_clean(!flags.is_empty());

        RowOutcome {
            cleaned: Some(cleaned),
            flags,
            log,
        }
    }

    /// Builds the cleaned record from a validated row.
    fn build_cleaned(&self, trip: NormalizedTrip, required: RequiredFields) -> CleanedTripRecord {
        let record_key = trip.record_key();
        let RequiredFields {
            pickup_ts,
            dropoff_ts,
            trip_distance,
            fare_amount,
            total_amount,
            pu_location_id,
            do_location_id,
        } = required;

        let duration_min = (dropoff_ts - pickup_ts).num_seconds() as f64 / 60.0;

        let revenue_per_minute = safe_div(total_amount, duration_min);
        let fare_per_mile = if trip_distance > 0.0 {
            safe_div(total_amount, trip_distance)
        } else {
            None
        };
        // Distance zero is a defined input: speed 0, not null. The division
        // itself stays guarded anyway.
        let avg_speed_mph = if trip_distance == 0.0 {
            Some(0.0)
        } else {
            safe_div(trip_distance, duration_min / 60.0)
        };
        let tip_percentage = match trip.tip_amount {
            Some(tip) if fare_amount > 0.0 => safe_div(100.0 * tip, fare_amount),
            _ => None,
        };

        let pickup_hour = pickup_ts.hour();
        let pickup_zone = self.zones.get(pu_location_id);
        let dropoff_zone = self.zones.get(do_location_id);

        CleanedTripRecord {
            record_key,
            source_file: trip.source_file,
            source_row_num: trip.source_row_num,
            vendor_id: trip.vendor_id,
            pickup_ts,
            dropoff_ts,
            passenger_count: trip.passenger_count,
            trip_distance,
            rate_code_id: trip.rate_code_id,
            store_and_fwd_flag: trip.store_and_fwd_flag,
            pu_location_id,
            do_location_id,
            payment_type: trip.payment_type,
            fare_amount,
            extra: trip.extra,
            mta_tax: trip.mta_tax,
            tip_amount: trip.tip_amount,
            tolls_amount: trip.tolls_amount,
            improvement_surcharge: trip.improvement_surcharge,
            total_amount,
            congestion_surcharge: trip.congestion_surcharge,
            duration_min,
            revenue_per_minute,
            fare_per_mile,
            avg_speed_mph,
            tip_percentage,
            pickup_hour,
            pickup_date: pickup_ts.date(),
            time_bucket: TimeBucket::from_hour(pickup_hour),
            pickup_borough: pickup_zone.map(|zone| zone.borough.clone()),
            pickup_zone: pickup_zone.map(|zone| zone.zone.clone()),
            dropoff_borough: dropoff_zone.map(|zone| zone.borough.clone()),
            dropoff_zone: dropoff_zone.map(|zone| zone.zone.clone()),
        }
    }
}

/// Fields the hard-exclusion predicate requires. Extracted during
/// validation so the builder never re-unwraps an `Option`.
#[derive(Debug, Clone, Copy)]
struct RequiredFields {
    pickup_ts: NaiveDateTime,
    dropoff_ts: NaiveDateTime,
    trip_distance: f64,
    fare_amount: f64,
    total_amount: f64,
    pu_location_id: u32,
    do_location_id: u32,
}

/// Evaluates the hard-exclusion predicate. Returns the extracted required
/// fields, or every reason the row must be excluded.
fn validate(trip: &NormalizedTrip) -> Result<RequiredFields, Vec<&'static str>> {
    let mut reasons = Vec::new();

    if trip.pickup_ts.is_none() {
        reasons.push("missing or unparseable pickup timestamp");
    }
    if trip.dropoff_ts.is_none() {
        reasons.push("missing or unparseable dropoff timestamp");
    }
    if trip.pu_location_id.is_none() {
        reasons.push("missing pickup location id");
    }
    if trip.do_location_id.is_none() {
        reasons.push("missing dropoff location id");
    }
    match trip.trip_distance {
        None => reasons.push("missing trip distance"),
        Some(distance) if distance < 0.0 => reasons.push("negative trip distance"),
        _ => {}
    }
    match trip.fare_amount {
        None => reasons.push("missing fare amount"),
        Some(fare) if fare < 0.0 => reasons.push("negative fare amount"),
        _ => {}
    }
    match trip.total_amount {
        None => reasons.push("missing total amount"),
        Some(total) if total < 0.0 => reasons.push("negative total amount"),
        _ => {}
    }
    if let (Some(pickup), Some(dropoff)) = (trip.pickup_ts, trip.dropoff_ts) {
        if (dropoff - pickup).num_seconds() <= 0 {
            reasons.push("non-positive duration");
        }
    }

    if !reasons.is_empty() {
        return Err(reasons);
    }

    match (
        trip.pickup_ts,
        trip.dropoff_ts,
        trip.trip_distance,
        trip.fare_amount,
        trip.total_amount,
        trip.pu_location_id,
        trip.do_location_id,
    ) {
        (
            Some(pickup_ts),
            Some(dropoff_ts),
            Some(trip_distance),
            Some(fare_amount),
            Some(total_amount),
            Some(pu_location_id),
            Some(do_location_id),
        ) => Ok(RequiredFields {
            pickup_ts,
            dropoff_ts,
            trip_distance,
            fare_amount,
            total_amount,
            pu_location_id,
            do_location_id,
        }),
        _ => Err(vec!["missing required field"]),
    }
}

/// Division that can never produce Infinity or NaN: a zero denominator or
/// a non-finite quotient is `None`.
fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let quotient = numerator / denominator;
    quotient.is_finite().then_some(quotient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::{ZoneLookupRow, ZoneReconciler};

    fn zones() -> Arc<ZoneDimension> {
        let reconciler = ZoneReconciler::new();
        let outcome = reconciler.reconcile(
            vec![
                ZoneLookupRow {
                    location_id: "41".to_string(),
                    borough: "Manhattan".to_string(),
                    zone: "Central Harlem".to_string(),
                    service_zone: "Boro Zone".to_string(),
                },
                ZoneLookupRow {
                    location_id: "24".to_string(),
                    borough: "Manhattan".to_string(),
                    zone: "Bloomingdale".to_string(),
                    service_zone: "Yellow Zone".to_string(),
                },
            ],
            vec![],
        );
        Arc::new(outcome.dimension)
    }

    fn engine() -> TripQualityEngine {
        TripQualityEngine::new(zones(), AnomalyThresholds::default())
    }

    fn raw_row(num: u64, fields: &[(&str, &str)]) -> RawTripRow {
        RawTripRow::new(
            "trips.csv",
            num,
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        )
    }

    fn valid_fields<'a>() -> Vec<(&'a str, &'a str)> {
        vec![
            ("tpep_pickup_datetime", "2019-01-01 08:00:00"),
            ("tpep_dropoff_datetime", "2019-01-01 08:15:00"),
            ("PULocationID", "41"),
            ("DOLocationID", "24"),
            ("passenger_count", "1"),
            ("trip_distance", "3.0"),
            ("fare_amount", "12.50"),
            ("tip_amount", "2.00"),
            ("total_amount", "15.80"),
        ]
    }

    #[test]
    fn test_valid_trip_is_cleaned_with_derived_features() {
        let engine = engine();
        let mut ctx = RunContext::new();

        let outcome = engine.process(&raw_row(1, &valid_fields()), &mut ctx);
        let cleaned = outcome.cleaned.expect("row should survive");

        assert_eq!(cleaned.duration_min, 15.0);
        assert_eq!(cleaned.revenue_per_minute, Some(15.80 / 15.0));
        assert_eq!(cleaned.fare_per_mile, Some(15.80 / 3.0));
        assert_eq!(cleaned.avg_speed_mph, Some(12.0));
        assert_eq!(cleaned.tip_percentage, Some(16.0));
        assert_eq!(cleaned.pickup_hour, 8);
        assert_eq!(cleaned.time_bucket, TimeBucket::MorningRush);
        assert_eq!(cleaned.pickup_borough.as_deref(), Some("Manhattan"));
        assert_eq!(cleaned.pickup_zone.as_deref(), Some("Central Harlem"));
        assert_eq!(cleaned.dropoff_zone.as_deref(), Some("Bloomingdale"));
        assert!(outcome.flags.is_empty());
        assert_eq!(ctx.counts.clean, 1);
    }

    #[test]
    fn test_duplicate_second_arrival_excluded() {
        let engine = engine();
        let mut ctx = RunContext::new();

        let first = engine.process(&raw_row(1, &valid_fields()), &mut ctx);
        let second = engine.process(&raw_row(2, &valid_fields()), &mut ctx);

        assert!(first.cleaned.is_some());
        assert!(second.cleaned.is_none());
        assert_eq!(second.log.len(), 1);
        assert_eq!(second.log[0].issue_type, IssueType::DuplicateTrip);
        assert_eq!(second.log[0].record_key, "trips.csv:2");
        assert_eq!(ctx.counts.duplicates, 1);
        assert_eq!(ctx.counts.clean, 1);
    }

    #[test]
    fn test_negative_duration_excluded() {
        // Dropoff one minute before pickup.
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[0] = ("tpep_pickup_datetime", "2019-01-01 08:00:00");
        fields[1] = ("tpep_dropoff_datetime", "2019-01-01 07:59:00");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);

        assert!(outcome.cleaned.is_none());
        assert_eq!(outcome.log[0].issue_type, IssueType::TripExcluded);
        assert!(outcome.log[0].details.contains("non-positive duration"));
        assert_eq!(ctx.counts.excluded, 1);
    }

    #[test]
    fn test_zero_duration_excluded() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[1] = ("tpep_dropoff_datetime", "2019-01-01 08:00:00");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        assert!(outcome.cleaned.is_none());
    }

    #[test]
    fn test_missing_required_fields_excluded_with_all_reasons() {
        let engine = engine();
        let mut ctx = RunContext::new();

        let outcome = engine.process(&raw_row(1, &[("trip_distance", "-1.0")]), &mut ctx);

        assert!(outcome.cleaned.is_none());
        let details = &outcome.log[0].details;
        assert!(details.contains("pickup timestamp"));
        assert!(details.contains("dropoff timestamp"));
        assert!(details.contains("negative trip distance"));
        assert!(details.contains("missing fare amount"));
    }

    #[test]
    fn test_zero_distance_trip_retained_with_null_fare_per_mile() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[5] = ("trip_distance", "0");
        fields[7] = ("tip_amount", "1.00");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        let cleaned = outcome.cleaned.expect("zero distance is retained");

        assert_eq!(cleaned.fare_per_mile, None);
        assert_eq!(cleaned.avg_speed_mph, Some(0.0));
        // Distance-gated rules cannot fire at zero distance; tip is under
        // half the fare, so nothing flags.
        assert!(outcome.flags.is_empty());
    }

    #[test]
    fn test_unparseable_optional_field_nulled_and_logged() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[7] = ("tip_amount", "abc");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        let cleaned = outcome.cleaned.expect("row survives with the tip nulled");

        assert_eq!(cleaned.tip_amount, None);
        assert_eq!(cleaned.tip_percentage, None);
        assert!(outcome.log.iter().any(|entry| {
            entry.issue_type == IssueType::UnparseableFieldValue
                && entry.action == LogAction::Retained
                && entry.record_key == "trips.csv:1"
                && entry.details.contains("tip_amount")
        }));
        assert_eq!(ctx.counts.clean, 1);
    }

    #[test]
    fn test_fully_parseable_row_logs_no_field_entries() {
        let engine = engine();
        let mut ctx = RunContext::new();

        let outcome = engine.process(&raw_row(1, &valid_fields()), &mut ctx);
        assert!(outcome.cleaned.is_some());
        assert!(outcome.log.is_empty());
    }

    #[test]
    fn test_unresolved_zone_leaves_labels_null_but_retains_trip() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[2] = ("PULocationID", "999");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        let cleaned = outcome.cleaned.expect("unresolved zone is not fatal");

        assert_eq!(cleaned.pickup_borough, None);
        assert_eq!(cleaned.pickup_zone, None);
        assert_eq!(cleaned.dropoff_borough.as_deref(), Some("Manhattan"));
    }

    #[test]
    fn test_speed_out_of_range_flagged_and_retained() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        // 30 miles in 15 minutes = 120 mph.
        fields[5] = ("trip_distance", "30.0");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        let cleaned = outcome.cleaned.expect("flagged trips stay cleaned");

        assert!(cleaned.avg_speed_mph.unwrap() > 80.0);
        assert!(outcome
            .flags
            .iter()
            .any(|flag| flag.anomaly_type == AnomalyType::SpeedOutOfRange));
        assert!(outcome
            .log
            .iter()
            .any(|entry| entry.action == LogAction::Flagged));
        assert_eq!(ctx.counts.flagged, 1);
        assert_eq!(ctx.counts.clean, 1);
    }

    #[test]
    fn test_multiple_flags_on_one_trip() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let outcome = engine.process(
            &raw_row(
                1,
                &[
                    ("tpep_pickup_datetime", "2019-01-01 12:00:00"),
                    // 30 seconds, 3 miles: conflict + 360 mph.
                    ("tpep_dropoff_datetime", "2019-01-01 12:00:30"),
                    ("PULocationID", "41"),
                    ("DOLocationID", "24"),
                    ("trip_distance", "3.0"),
                    ("fare_amount", "10.00"),
                    ("tip_amount", "8.00"),
                    ("total_amount", "18.00"),
                ],
            ),
            &mut ctx,
        );

        let kinds: Vec<AnomalyType> = outcome
            .flags
            .iter()
            .map(|flag| flag.anomaly_type)
            .collect();
        assert!(kinds.contains(&AnomalyType::SpeedOutOfRange));
        assert!(kinds.contains(&AnomalyType::DurationDistanceConflict));
        assert!(kinds.contains(&AnomalyType::TipOver50Percent));
        assert!(outcome.cleaned.is_some());
        // One flagged trip, regardless of how many rules matched.
        assert_eq!(ctx.counts.flagged, 1);
    }

    #[test]
    fn test_tip_over_half_of_fare_flagged() {
        let engine = engine();
        let mut ctx = RunContext::new();
        let mut fields = valid_fields();
        fields[7] = ("tip_amount", "7.00");

        let outcome = engine.process(&raw_row(1, &fields), &mut ctx);
        assert!(outcome
            .flags
            .iter()
            .any(|flag| flag.anomaly_type == AnomalyType::TipOver50Percent));
    }

    #[test]
    fn test_time_buckets() {
        assert_eq!(TimeBucket::from_hour(7), TimeBucket::MorningRush);
        assert_eq!(TimeBucket::from_hour(9), TimeBucket::MorningRush);
        assert_eq!(TimeBucket::from_hour(10), TimeBucket::OffPeak);
        assert_eq!(TimeBucket::from_hour(16), TimeBucket::EveningRush);
        assert_eq!(TimeBucket::from_hour(18), TimeBucket::EveningRush);
        assert_eq!(TimeBucket::from_hour(19), TimeBucket::OffPeak);
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::OffPeak);
    }

    #[test]
    fn test_safe_div_never_produces_non_finite() {
        assert_eq!(safe_div(1.0, 0.0), None);
        assert_eq!(safe_div(0.0, 0.0), None);
        assert_eq!(safe_div(10.0, 4.0), Some(2.5));
    }
}
