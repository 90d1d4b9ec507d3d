//! Field normalization for raw trip rows.
//!
//! Column names drift across input vintages (yellow vs green feeds,
//! re-exports with snake_case headers), so every logical field is resolved
//! through an explicit ordered alias list instead of ad hoc header access
//! scattered through the rules. Parsing is graceful: a single bad field
//! becomes `None`, never an error — whether that excludes the row is the
//! engine's decision, not the parser's.

use std::collections::HashMap;

use chrono::NaiveDateTime;

/// One raw trip row exactly as received, tagged for traceability.
///
/// Header names are stored lowercased; values are untouched. Consumed by
/// the quality engine and never persisted.
#[derive(Debug, Clone)]
pub struct RawTripRow {
    /// File the row came from.
    pub source_file: String,
    /// 1-based row number within the file.
    pub source_row_num: u64,
    /// Lowercased header name -> raw value.
    pub fields: HashMap<String, String>,
}

impl RawTripRow {
    /// Creates a row, lowercasing header names on the way in.
    pub fn new(
        source_file: impl Into<String>,
        source_row_num: u64,
        fields: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            source_row_num,
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
        }
    }

    /// Stable identifier for audit entries: `file:row`.
    pub fn record_key(&self) -> String {
        format!("{}:{}", self.source_file, self.source_row_num)
    }

    /// Resolves a logical field through its ordered alias list. The first
    /// alias present with a non-blank value wins.
    fn resolve(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|alias| {
            self.fields
                .get(*alias)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        })
    }
}

/// Ordered column-name aliases per logical field. Earlier names win.
const VENDOR_ID: &[&str] = &["vendorid", "vendor_id"];
const PICKUP_TS: &[&str] = &[
    "tpep_pickup_datetime",
    "lpep_pickup_datetime",
    "pickup_datetime",
    "pickup_ts",
];
const DROPOFF_TS: &[&str] = &[
    "tpep_dropoff_datetime",
    "lpep_dropoff_datetime",
    "dropoff_datetime",
    "dropoff_ts",
];
const PASSENGER_COUNT: &[&str] = &["passenger_count", "passengers"];
const TRIP_DISTANCE: &[&str] = &["trip_distance", "distance"];
const RATE_CODE_ID: &[&str] = &["ratecodeid", "rate_code_id", "rate_code"];
const STORE_AND_FWD_FLAG: &[&str] = &["store_and_fwd_flag", "store_and_forward"];
const PU_LOCATION_ID: &[&str] = &["pulocationid", "pu_location_id", "pickup_location_id"];
const DO_LOCATION_ID: &[&str] = &["dolocationid", "do_location_id", "dropoff_location_id"];
const PAYMENT_TYPE: &[&str] = &["payment_type", "payment"];
const FARE_AMOUNT: &[&str] = &["fare_amount", "fare"];
const EXTRA: &[&str] = &["extra"];
const MTA_TAX: &[&str] = &["mta_tax"];
const TIP_AMOUNT: &[&str] = &["tip_amount", "tip"];
const TOLLS_AMOUNT: &[&str] = &["tolls_amount", "tolls"];
const IMPROVEMENT_SURCHARGE: &[&str] = &["improvement_surcharge"];
const TOTAL_AMOUNT: &[&str] = &["total_amount", "total"];
const CONGESTION_SURCHARGE: &[&str] = &["congestion_surcharge"];

/// Timestamp formats accepted across input vintages, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M",
];

/// A trip row after alias resolution and parsing. Every field is optional;
/// the hard-exclusion predicate decides which absences are fatal.
///
/// `parse_failures` lists the fields that were present but unparseable, so
/// the engine can put every nulled value on the audit trail.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTrip {
    pub source_file: String,
    pub source_row_num: u64,
    pub vendor_id: Option<String>,
    pub pickup_ts: Option<NaiveDateTime>,
    pub dropoff_ts: Option<NaiveDateTime>,
    pub passenger_count: Option<i64>,
    pub trip_distance: Option<f64>,
    pub rate_code_id: Option<i64>,
    pub store_and_fwd_flag: Option<String>,
    pub pu_location_id: Option<u32>,
    pub do_location_id: Option<u32>,
    pub payment_type: Option<i64>,
    pub fare_amount: Option<f64>,
    pub extra: Option<f64>,
    pub mta_tax: Option<f64>,
    pub tip_amount: Option<f64>,
    pub tolls_amount: Option<f64>,
    pub improvement_surcharge: Option<f64>,
    pub total_amount: Option<f64>,
    pub congestion_surcharge: Option<f64>,
    /// Fields present in the raw row whose values failed to parse.
    pub parse_failures: Vec<&'static str>,
}

impl NormalizedTrip {
    /// Stable identifier for audit entries: `file:row`.
    pub fn record_key(&self) -> String {
        format!("{}:{}", self.source_file, self.source_row_num)
    }
}

/// Resolves aliases and parses every logical field of a raw row.
pub fn normalize(row: &RawTripRow) -> NormalizedTrip {
    let mut failures = Vec::new();
    NormalizedTrip {
        source_file: row.source_file.clone(),
        source_row_num: row.source_row_num,
        vendor_id: row.resolve(VENDOR_ID).map(str::to_string),
        pickup_ts: parsed(row.resolve(PICKUP_TS), "pickup_ts", parse_timestamp, &mut failures),
        dropoff_ts: parsed(
            row.resolve(DROPOFF_TS),
            "dropoff_ts",
            parse_timestamp,
            &mut failures,
        ),
        passenger_count: parsed(
            row.resolve(PASSENGER_COUNT),
            "passenger_count",
            parse_i64,
            &mut failures,
        ),
        trip_distance: parsed(
            row.resolve(TRIP_DISTANCE),
            "trip_distance",
            parse_f64,
            &mut failures,
        ),
        rate_code_id: parsed(
            row.resolve(RATE_CODE_ID),
            "rate_code_id",
            parse_i64,
            &mut failures,
        ),
        store_and_fwd_flag: row.resolve(STORE_AND_FWD_FLAG).map(str::to_string),
        pu_location_id: parsed(
            row.resolve(PU_LOCATION_ID),
            "pu_location_id",
            parse_location_id,
            &mut failures,
        ),
        do_location_id: parsed(
            row.resolve(DO_LOCATION_ID),
            "do_location_id",
            parse_location_id,
            &mut failures,
        ),
        payment_type: parsed(
            row.resolve(PAYMENT_TYPE),
            "payment_type",
            parse_i64,
            &mut failures,
        ),
        fare_amount: parsed(
            row.resolve(FARE_AMOUNT),
            "fare_amount",
            parse_f64,
            &mut failures,
        ),
        extra: parsed(row.resolve(EXTRA), "extra", parse_f64, &mut failures),
        mta_tax: parsed(row.resolve(MTA_TAX), "mta_tax", parse_f64, &mut failures),
        tip_amount: parsed(
            row.resolve(TIP_AMOUNT),
            "tip_amount",
            parse_f64,
            &mut failures,
        ),
        tolls_amount: parsed(
            row.resolve(TOLLS_AMOUNT),
            "tolls_amount",
            parse_f64,
            &mut failures,
        ),
        improvement_surcharge: parsed(
            row.resolve(IMPROVEMENT_SURCHARGE),
            "improvement_surcharge",
            parse_f64,
            &mut failures,
        ),
        total_amount: parsed(
            row.resolve(TOTAL_AMOUNT),
            "total_amount",
            parse_f64,
            &mut failures,
        ),
        congestion_surcharge: parsed(
            row.resolve(CONGESTION_SURCHARGE),
            "congestion_surcharge",
            parse_f64,
            &mut failures,
        ),
        parse_failures: failures,
    }
}

/// Parses a resolved raw value, recording the field on failure. A missing
/// field is not a failure; a present value that does not parse is.
fn parsed<T>(
    raw: Option<&str>,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
    failures: &mut Vec<&'static str>,
) -> Option<T> {
    let raw = raw?;
    let value = parse(raw);
    if value.is_none() {
        failures.push(field);
    }
    value
}

/// Parses a timestamp, trying each accepted format in order.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Parses a float; non-finite values are treated as unparseable.
fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses an integer, tolerating a trailing float suffix ("1.0").
fn parse_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

/// Parses a location id, accepting only positive integers.
fn parse_location_id(raw: &str) -> Option<u32> {
    parse_i64(raw)
        .filter(|&id| id > 0)
        .and_then(|id| u32::try_from(id).ok())
}
