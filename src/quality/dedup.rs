//! Natural-key duplicate detection state.
//!
//! The seen-key set is the moral equivalent of the warehouse idiom
//! `ROW_NUMBER() OVER (PARTITION BY natural_key ORDER BY arrival)` keeping
//! rank 1: the first arrival for a key survives, every later arrival is a
//! duplicate. The set is owned by a [`RunContext`] scoped to exactly one
//! ingestion run and passed by reference through the pipeline — never a
//! static — so concurrent runs and tests cannot interfere.

use std::collections::HashSet;

use uuid::Uuid;

use crate::audit::RecordCounts;

use super::normalize::NormalizedTrip;

/// The tuple of business fields that identifies "the same real-world trip".
///
/// Float fields are keyed by their bit patterns, so the key is exact: trips
/// differing by sub-cent rounding are distinct on purpose. Rate code is
/// deliberately not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pickup_ts: Option<i64>,
    dropoff_ts: Option<i64>,
    pu_location_id: Option<u32>,
    do_location_id: Option<u32>,
    passenger_count: Option<i64>,
    trip_distance_bits: Option<u64>,
    fare_amount_bits: Option<u64>,
    tip_amount_bits: Option<u64>,
    total_amount_bits: Option<u64>,
}

impl NaturalKey {
    /// Derives the natural key from a normalized trip.
    pub fn from_trip(trip: &NormalizedTrip) -> Self {
        Self {
            pickup_ts: trip.pickup_ts.map(|ts| ts.and_utc().timestamp()),
            dropoff_ts: trip.dropoff_ts.map(|ts| ts.and_utc().timestamp()),
            pu_location_id: trip.pu_location_id,
            do_location_id: trip.do_location_id,
            passenger_count: trip.passenger_count,
            trip_distance_bits: trip.trip_distance.map(f64::to_bits),
            fare_amount_bits: trip.fare_amount.map(f64::to_bits),
            tip_amount_bits: trip.tip_amount.map(f64::to_bits),
            total_amount_bits: trip.total_amount.map(f64::to_bits),
        }
    }
}

/// Mutable state for one ingestion run: the global seen-key set and the
/// operator counters. Lives for the whole run; the key set is the dominant
/// memory cost and must not be discarded between batches.
#[derive(Debug)]
pub struct RunContext {
    /// Identifies this run in logs and the summary.
    pub run_id: Uuid,
    /// Counters for the run summary.
    pub counts: RecordCounts,
    seen: HashSet<NaturalKey>,
}

impl RunContext {
    /// Creates a fresh context with a new run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            counts: RecordCounts::default(),
            seen: HashSet::new(),
        }
    }

    /// Records a key; returns true if this is its first arrival.
    pub fn first_arrival(&mut self, key: NaturalKey) -> bool {
        self.seen.insert(key)
    }

    /// Number of distinct natural keys seen so far.
    pub fn distinct_keys(&self) -> usize {
        self.seen.len()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(distance: f64, fare: f64) -> NormalizedTrip {
        NormalizedTrip {
            source_file: "trips.csv".to_string(),
            source_row_num: 1,
            pickup_ts: crate::quality::normalize::parse_timestamp("2019-01-01 08:00:00"),
            dropoff_ts: crate::quality::normalize::parse_timestamp("2019-01-01 08:15:00"),
            pu_location_id: Some(41),
            do_location_id: Some(24),
            passenger_count: Some(1),
            trip_distance: Some(distance),
            fare_amount: Some(fare),
            tip_amount: Some(2.0),
            total_amount: Some(fare + 2.0),
            ..NormalizedTrip::default()
        }
    }

    #[test]
    fn test_identical_trips_share_a_key() {
        let a = NaturalKey::from_trip(&trip(3.2, 12.5));
        let b = NaturalKey::from_trip(&trip(3.2, 12.5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_subcent_difference_is_a_distinct_key() {
        let a = NaturalKey::from_trip(&trip(3.2, 12.50));
        let b = NaturalKey::from_trip(&trip(3.2, 12.501));
        assert_ne!(a, b);
    }

    #[test]
    fn test_first_arrival_wins() {
        let mut ctx = RunContext::new();
        let key = NaturalKey::from_trip(&trip(3.2, 12.5));

        assert!(ctx.first_arrival(key));
        assert!(!ctx.first_arrival(key));
        assert_eq!(ctx.distinct_keys(), 1);
    }

    #[test]
    fn test_contexts_are_independent() {
        let key = NaturalKey::from_trip(&trip(3.2, 12.5));

        let mut first_run = RunContext::new();
        assert!(first_run.first_arrival(key));

        let mut second_run = RunContext::new();
        assert!(second_run.first_arrival(key));
        assert_ne!(first_run.run_id, second_run.run_id);
    }
}
