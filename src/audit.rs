//! Audit-trail vocabulary shared by zone reconciliation and the trip
//! quality pipeline.
//!
//! Every per-record decision — exclusion, retention with a caveat, soft
//! flag — becomes one [`QualityLogEntry`]. The log is append-only: entries
//! are accumulated, batched, and persisted, never edited.

use serde::{Deserialize, Serialize};

/// Which input dataset a log entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    ZoneLookup,
    ZoneGeometry,
    Trips,
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dataset::ZoneLookup => "zone_lookup",
            Dataset::ZoneGeometry => "zone_geometry",
            Dataset::Trips => "trips",
        };
        write!(f, "{}", name)
    }
}

/// Every kind of issue the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    // Zone reference issues.
    InvalidLocationId,
    BlankTextValue,
    DuplicateLocationId,
    DuplicateShapeMetadata,
    FixedWidthPadding,
    MissingGeometry,
    // Trip issues.
    DuplicateTrip,
    TripExcluded,
    UnparseableFieldValue,
    // Soft-flag anomalies.
    SpeedOutOfRange,
    FarePerMileOutOfRange,
    DurationDistanceConflict,
    #[serde(rename = "TIP_OVER_50_PERCENT")]
    TipOver50Percent,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IssueType::InvalidLocationId => "INVALID_LOCATION_ID",
            IssueType::BlankTextValue => "BLANK_TEXT_VALUE",
            IssueType::DuplicateLocationId => "DUPLICATE_LOCATION_ID",
            IssueType::DuplicateShapeMetadata => "DUPLICATE_SHAPE_METADATA",
            IssueType::FixedWidthPadding => "FIXED_WIDTH_PADDING",
            IssueType::MissingGeometry => "MISSING_GEOMETRY",
            IssueType::DuplicateTrip => "DUPLICATE_TRIP",
            IssueType::TripExcluded => "TRIP_EXCLUDED",
            IssueType::UnparseableFieldValue => "UNPARSEABLE_FIELD_VALUE",
            IssueType::SpeedOutOfRange => "SPEED_OUT_OF_RANGE",
            IssueType::FarePerMileOutOfRange => "FARE_PER_MILE_OUT_OF_RANGE",
            IssueType::DurationDistanceConflict => "DURATION_DISTANCE_CONFLICT",
            IssueType::TipOver50Percent => "TIP_OVER_50_PERCENT",
        };
        write!(f, "{}", name)
    }
}

/// What the pipeline did with the record the entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    /// The record was dropped from the pipeline.
    Excluded,
    /// The record survived; the issue was informational.
    Retained,
    /// The record survived but cannot be drawn on a map.
    RetainedNonMappable,
    /// The record survived with a soft-flag annotation.
    Flagged,
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogAction::Excluded => "excluded",
            LogAction::Retained => "retained",
            LogAction::RetainedNonMappable => "retained_non_mappable",
            LogAction::Flagged => "flagged",
        };
        write!(f, "{}", name)
    }
}

/// One append-only audit entry for one per-record decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityLogEntry {
    /// Dataset the record came from.
    pub dataset: Dataset,
    /// Key identifying the record: a location id, or `file:row` for trips.
    pub record_key: String,
    pub issue_type: IssueType,
    pub action: LogAction,
    /// Human-readable detail for the operator.
    pub details: String,
}

impl QualityLogEntry {
    /// Creates an entry.
    pub fn new(
        dataset: Dataset,
        record_key: impl Into<String>,
        issue_type: IssueType,
        action: LogAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            dataset,
            record_key: record_key.into(),
            issue_type,
            action,
            details: details.into(),
        }
    }
}

/// Per-run trip counters. `clean` includes flagged records: a soft flag
/// never removes a record, so `total_raw = excluded + duplicates + clean`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    /// Rows read from the trip inputs.
    pub total_raw: u64,
    /// Rows dropped by a hard-exclusion rule.
    pub excluded: u64,
    /// Rows dropped as natural-key duplicates.
    pub duplicates: u64,
    /// Retained rows carrying at least one soft flag.
    pub flagged: u64,
    /// Rows retained in the cleaned output.
    pub clean: u64,
}

impl RecordCounts {
    /// Counts a row dropped by a hard exclusion.
    pub fn record_excluded(&mut self) {
        self.total_raw += 1;
        self.excluded += 1;
    }

    /// Counts a row dropped as a duplicate.
    pub fn record_duplicate(&mut self) {
        self.total_raw += 1;
        self.duplicates += 1;
    }

    /// Counts a retained row. A row with several flags still counts once.
    pub fn record_clean(&mut self, was_flagged: bool) {
        self.total_raw += 1;
        self.clean += 1;
        if was_flagged {
            self.flagged += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_type_display_matches_serde_name() {
        for issue in [
            IssueType::InvalidLocationId,
            IssueType::BlankTextValue,
            IssueType::DuplicateLocationId,
            IssueType::DuplicateShapeMetadata,
            IssueType::FixedWidthPadding,
            IssueType::MissingGeometry,
            IssueType::DuplicateTrip,
            IssueType::TripExcluded,
            IssueType::UnparseableFieldValue,
            IssueType::SpeedOutOfRange,
            IssueType::FarePerMileOutOfRange,
            IssueType::DurationDistanceConflict,
            IssueType::TipOver50Percent,
        ] {
            let json = serde_json::to_string(&issue).unwrap();
            assert_eq!(json, format!("\"{}\"", issue));
        }
    }

    #[test]
    fn test_action_display_matches_serde_name() {
        for action in [
            LogAction::Excluded,
            LogAction::Retained,
            LogAction::RetainedNonMappable,
            LogAction::Flagged,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action));
        }
    }

    #[test]
    fn test_counts_add_up() {
        let mut counts = RecordCounts::default();
        counts.record_clean(false);
        counts.record_clean(true);
        counts.record_duplicate();
        counts.record_excluded();

        assert_eq!(counts.total_raw, 4);
        assert_eq!(counts.clean, 2);
        assert_eq!(counts.flagged, 1);
        assert_eq!(counts.duplicates, 1);
        assert_eq!(counts.excluded, 1);
        assert_eq!(
            counts.total_raw,
            counts.excluded + counts.duplicates + counts.clean
        );
    }
}
