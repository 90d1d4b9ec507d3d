//! Soft-flag anomaly rules.
//!
//! Each rule is evaluated independently against a finished cleaned record;
//! a record can match several rules and stays in the cleaned output either
//! way. Flags are additive annotations, not an alternate classification.

use serde::{Deserialize, Serialize};

use crate::audit::IssueType;

use super::engine::CleanedTripRecord;

/// Default ceiling for average speed before a trip looks suspicious.
const DEFAULT_MAX_SPEED_MPH: f64 = 80.0;

/// Default floor for average speed before a trip looks suspicious.
const DEFAULT_MIN_SPEED_MPH: f64 = 1.0;

/// Default minimum distance for the speed rules to apply at all.
const DEFAULT_MIN_DISTANCE_FOR_SPEED: f64 = 0.5;

/// Default fare-per-mile bounds.
const DEFAULT_FARE_PER_MILE_MAX: f64 = 50.0;
const DEFAULT_FARE_PER_MILE_MIN: f64 = 1.0;

/// Default duration/distance conflict bounds: under a minute yet over two
/// miles is physically implausible.
const DEFAULT_CONFLICT_MAX_DURATION_MIN: f64 = 1.0;
const DEFAULT_CONFLICT_MIN_DISTANCE: f64 = 2.0;

/// Default tip-to-fare ratio ceiling.
const DEFAULT_TIP_FARE_RATIO_CEILING: f64 = 0.5;

/// Tunable thresholds for every soft-flag rule. All overridable through
/// the pipeline configuration; rule code never hardcodes a bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    /// Speed rules only apply to trips longer than this (miles).
    pub min_distance_for_speed: f64,
    /// Average speed above this is suspicious (mph).
    pub max_speed_mph: f64,
    /// Average speed below this is suspicious (mph).
    pub min_speed_mph: f64,
    /// Fare per mile above this is suspicious.
    pub fare_per_mile_max: f64,
    /// Fare per mile below this is suspicious.
    pub fare_per_mile_min: f64,
    /// Conflict rule: duration below this many minutes...
    pub conflict_max_duration_min: f64,
    /// ...combined with distance above this many miles.
    pub conflict_min_distance: f64,
    /// Tip above this fraction of the fare is suspicious.
    pub tip_fare_ratio_ceiling: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            min_distance_for_speed: DEFAULT_MIN_DISTANCE_FOR_SPEED,
            max_speed_mph: DEFAULT_MAX_SPEED_MPH,
            min_speed_mph: DEFAULT_MIN_SPEED_MPH,
            fare_per_mile_max: DEFAULT_FARE_PER_MILE_MAX,
            fare_per_mile_min: DEFAULT_FARE_PER_MILE_MIN,
            conflict_max_duration_min: DEFAULT_CONFLICT_MAX_DURATION_MIN,
            conflict_min_distance: DEFAULT_CONFLICT_MIN_DISTANCE,
            tip_fare_ratio_ceiling: DEFAULT_TIP_FARE_RATIO_CEILING,
        }
    }
}

/// Kinds of anomalies a cleaned trip can be flagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    SpeedOutOfRange,
    FarePerMileOutOfRange,
    DurationDistanceConflict,
    #[serde(rename = "TIP_OVER_50_PERCENT")]
    TipOver50Percent,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnomalyType::SpeedOutOfRange => "SPEED_OUT_OF_RANGE",
            AnomalyType::FarePerMileOutOfRange => "FARE_PER_MILE_OUT_OF_RANGE",
            AnomalyType::DurationDistanceConflict => "DURATION_DISTANCE_CONFLICT",
            AnomalyType::TipOver50Percent => "TIP_OVER_50_PERCENT",
        };
        write!(f, "{}", name)
    }
}

impl From<AnomalyType> for IssueType {
    fn from(anomaly: AnomalyType) -> Self {
        match anomaly {
            AnomalyType::SpeedOutOfRange => IssueType::SpeedOutOfRange,
            AnomalyType::FarePerMileOutOfRange => IssueType::FarePerMileOutOfRange,
            AnomalyType::DurationDistanceConflict => IssueType::DurationDistanceConflict,
            AnomalyType::TipOver50Percent => IssueType::TipOver50Percent,
        }
    }
}

/// Severity attached to a flag. Soft-flag rules all produce `Suspicious`;
/// hard problems never reach the flagging stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Suspicious,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Suspicious => write!(f, "suspicious"),
        }
    }
}

/// Evaluates every soft-flag rule against cleaned records.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    /// Creates a detector with the given thresholds.
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Returns every rule the record matches, with a human-readable detail
    /// string per match.
    pub fn evaluate(&self, record: &CleanedTripRecord) -> Vec<(AnomalyType, String)> {
        let t = &self.thresholds;
        let mut matches = Vec::new();

        if record.trip_distance > t.min_distance_for_speed {
            if let Some(speed) = record.avg_speed_mph {
                if speed > t.max_speed_mph || speed < t.min_speed_mph {
                    matches.push((
                        AnomalyType::SpeedOutOfRange,
                        format!(
                            "avg speed {:.1} mph outside [{}, {}]",
                            speed, t.min_speed_mph, t.max_speed_mph
                        ),
                    ));
                }
            }
        }

        if record.trip_distance > 0.0 {
            if let Some(fare_per_mile) = record.fare_per_mile {
                if fare_per_mile > t.fare_per_mile_max || fare_per_mile < t.fare_per_mile_min {
                    matches.push((
                        AnomalyType::FarePerMileOutOfRange,
                        format!(
                            "fare per mile {:.2} outside [{}, {}]",
                            fare_per_mile, t.fare_per_mile_min, t.fare_per_mile_max
                        ),
                    ));
                }
            }
        }

        if record.duration_min < t.conflict_max_duration_min
            && record.trip_distance > t.conflict_min_distance
        {
            matches.push((
                AnomalyType::DurationDistanceConflict,
                format!(
                    "{:.1} miles in {:.2} minutes",
                    record.trip_distance, record.duration_min
                ),
            ));
        }

        if record.fare_amount > 0.0 {
            if let Some(tip) = record.tip_amount {
                if tip > t.tip_fare_ratio_ceiling * record.fare_amount {
                    matches.push((
                        AnomalyType::TipOver50Percent,
                        format!(
                            "tip {:.2} exceeds {:.0}% of fare {:.2}",
                            tip,
                            t.tip_fare_ratio_ceiling * 100.0,
                            record.fare_amount
                        ),
                    ));
                }
            }
        }

        matches
    }
}
