//! Zone dimension types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Raw zone name lookup row as handed over by the reader adapter.
///
/// All fields arrive as text; validation and parsing happen in the
/// reconciler so that bad rows can be logged rather than rejected at
/// the file boundary.
#[derive(Debug, Clone)]
pub struct ZoneLookupRow {
    pub location_id: String,
    pub borough: String,
    pub zone: String,
    pub service_zone: String,
}

/// Raw zone geometry metadata row. May repeat a location id, and its text
/// fields may carry fixed-width padding.
#[derive(Debug, Clone)]
pub struct ZoneGeometryRow {
    pub location_id: String,
    pub borough: String,
    pub zone: String,
    pub service_zone: String,
}

/// Whether a zone can be drawn on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapStatus {
    /// Geometry metadata exists for this zone.
    Mappable,
    /// No geometry metadata; the zone is still a valid lookup target.
    MissingGeometry,
}

impl std::fmt::Display for MapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MapStatus::Mappable => "mappable",
            MapStatus::MissingGeometry => "missing_geometry",
        };
        write!(f, "{}", name)
    }
}

/// One canonical zone. Exactly one exists per location id in the lookup
/// input; immutable once a reconciliation run has produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub location_id: u32,
    pub borough: String,
    pub zone: String,
    pub service_zone: String,
    pub has_geometry: bool,
    pub geometry_record_count: u32,
    pub map_status: MapStatus,
}

/// Summary counts for one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Lookup rows read, before any validation.
    pub lookup_rows_in: u64,
    /// Geometry rows read, before any validation.
    pub geometry_rows_in: u64,
    /// Zones in the output dimension.
    pub zones_out: u64,
    /// Distinct location ids with at least one surviving geometry row.
    pub unique_geometry_ids: u64,
    /// Excess geometry rows dropped by intra-id dedup.
    pub duplicate_geometry_removed: u64,
    /// Location ids retained without any geometry, ascending.
    pub missing_geometry_ids: Vec<u32>,
}

/// The finished zone dimension: records sorted by location id plus an
/// id index for O(1) joins from the trip pipeline.
#[derive(Debug, Clone, Default)]
pub struct ZoneDimension {
    records: Vec<ZoneRecord>,
    by_id: HashMap<u32, usize>,
}

impl ZoneDimension {
    /// Builds a dimension from records already sorted by location id.
    pub(crate) fn new(records: Vec<ZoneRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.location_id, idx))
            .collect();
        Self { records, by_id }
    }

    /// Looks up a zone by location id.
    pub fn get(&self, location_id: u32) -> Option<&ZoneRecord> {
        self.by_id
            .get(&location_id)
            .map(|&idx| &self.records[idx])
    }

    /// All zones, ascending by location id.
    pub fn records(&self) -> &[ZoneRecord] {
        &self.records
    }

    /// Number of zones in the dimension.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the dimension holds no zones.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
