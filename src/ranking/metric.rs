//! Ranking metrics over cleaned trip records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quality::CleanedTripRecord;

use super::topk::TopK;

/// A numeric field of a cleaned trip that ranking endpoints can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    RevenuePerMinute,
    FarePerMile,
    TipPercentage,
    AvgSpeedMph,
    TripDistance,
    TotalAmount,
}

impl RankMetric {
    /// Extracts the metric value from a record. `None` means the value is
    /// unavailable (null-guarded derivation) — the selector treats it as
    /// unrankable rather than zero.
    pub fn value(&self, record: &CleanedTripRecord) -> Option<f64> {
        match self {
            RankMetric::RevenuePerMinute => record.revenue_per_minute,
            RankMetric::FarePerMile => record.fare_per_mile,
            RankMetric::TipPercentage => record.tip_percentage,
            RankMetric::AvgSpeedMph => record.avg_speed_mph,
            RankMetric::TripDistance => Some(record.trip_distance),
            RankMetric::TotalAmount => Some(record.total_amount),
        }
    }
}

impl std::fmt::Display for RankMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RankMetric::RevenuePerMinute => "revenue_per_minute",
            RankMetric::FarePerMile => "fare_per_mile",
            RankMetric::TipPercentage => "tip_percentage",
            RankMetric::AvgSpeedMph => "avg_speed_mph",
            RankMetric::TripDistance => "trip_distance",
            RankMetric::TotalAmount => "total_amount",
        };
        write!(f, "{}", name)
    }
}

/// Error for unrecognized metric names.
#[derive(Debug, Error)]
#[error("Unknown ranking metric '{0}'; expected one of revenue_per_minute, fare_per_mile, tip_percentage, avg_speed_mph, trip_distance, total_amount")]
pub struct UnknownMetric(String);

impl std::str::FromStr for RankMetric {
    type Err = UnknownMetric;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "revenue_per_minute" => Ok(RankMetric::RevenuePerMinute),
            "fare_per_mile" => Ok(RankMetric::FarePerMile),
            "tip_percentage" => Ok(RankMetric::TipPercentage),
            "avg_speed_mph" => Ok(RankMetric::AvgSpeedMph),
            "trip_distance" => Ok(RankMetric::TripDistance),
            "total_amount" => Ok(RankMetric::TotalAmount),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

/// Ranking query contract: the k highest-scoring candidates by `metric`,
/// descending, without sorting the full candidate set. Records with no
/// value for the metric are skipped.
pub fn top_k(
    records: impl IntoIterator<Item = CleanedTripRecord>,
    metric: RankMetric,
    k: usize,
) -> Vec<CleanedTripRecord> {
    let mut selector = TopK::new(k);
    for record in records {
        if let Some(score) = metric.value(&record) {
            selector.push(record, score);
        }
    }
    selector.into_sorted_desc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::TimeBucket;
    use chrono::NaiveDate;

    fn record(row: u64, revenue_per_minute: Option<f64>) -> CleanedTripRecord {
        let pickup = NaiveDate::from_ymd_opt(2019, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        CleanedTripRecord {
            record_key: format!("trips.csv:{row}"),
            source_file: "trips.csv".to_string(),
            source_row_num: row,
            vendor_id: None,
            pickup_ts: pickup,
            dropoff_ts: pickup + chrono::Duration::minutes(10),
            passenger_count: Some(1),
            trip_distance: 2.0,
            rate_code_id: None,
            store_and_fwd_flag: None,
            pu_location_id: 41,
            do_location_id: 24,
            payment_type: None,
            fare_amount: 10.0,
            extra: None,
            mta_tax: None,
            tip_amount: None,
            tolls_amount: None,
            improvement_surcharge: None,
            total_amount: 12.0,
            congestion_surcharge: None,
            duration_min: 10.0,
            revenue_per_minute,
            fare_per_mile: Some(6.0),
            avg_speed_mph: Some(12.0),
            tip_percentage: None,
            pickup_hour: 8,
            pickup_date: pickup.date(),
            time_bucket: TimeBucket::MorningRush,
            pickup_borough: None,
            pickup_zone: None,
            dropoff_borough: None,
            dropoff_zone: None,
        }
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!(
            "revenue_per_minute".parse::<RankMetric>().unwrap(),
            RankMetric::RevenuePerMinute
        );
        assert_eq!(
            " Fare_Per_Mile ".parse::<RankMetric>().unwrap(),
            RankMetric::FarePerMile
        );
        assert!("bogus".parse::<RankMetric>().is_err());
    }

    #[test]
    fn test_top_k_by_metric() {
        let records = vec![
            record(1, Some(1.2)),
            record(2, Some(3.4)),
            record(3, Some(0.5)),
            record(4, Some(2.8)),
        ];

        let top = top_k(records, RankMetric::RevenuePerMinute, 2);
        let keys: Vec<&str> = top.iter().map(|r| r.record_key.as_str()).collect();
        assert_eq!(keys, vec!["trips.csv:2", "trips.csv:4"]);
    }

    #[test]
    fn test_null_metric_values_are_skipped() {
        let records = vec![record(1, None), record(2, Some(1.0))];

        let top = top_k(records, RankMetric::RevenuePerMinute, 5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].record_key, "trips.csv:2");
    }
}
