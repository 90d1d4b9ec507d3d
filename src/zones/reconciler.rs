//! Zone reconciliation: merges the zone name lookup and the zone geometry
//! metadata into one canonical dimension.
//!
//! The contract is that no location id referenced by the lookup dataset is
//! ever silently dropped — a zone without geometry stays in the output with
//! `map_status = missing_geometry` and an audit entry, so downstream joins
//! keep working while the gap stays visible.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::audit::{Dataset, IssueType, LogAction, QualityLogEntry};

use super::types::{
    MapStatus, ReconcileSummary, ZoneDimension, ZoneGeometryRow, ZoneLookupRow, ZoneRecord,
};

/// Result of one reconciliation run.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Canonical zones, ascending by location id.
    pub dimension: ZoneDimension,
    /// Audit entries accumulated during the run.
    pub issues: Vec<QualityLogEntry>,
    /// Operator-facing counts.
    pub summary: ReconcileSummary,
}

/// Merges two imperfect reference datasets into one zone dimension.
#[derive(Debug, Default)]
pub struct ZoneReconciler;

impl ZoneReconciler {
    /// Creates a new reconciler.
    pub fn new() -> Self {
        Self
    }

    /// Runs the full reconciliation over both reference datasets.
    pub fn reconcile(
        &self,
        lookup_rows: Vec<ZoneLookupRow>,
        geometry_rows: Vec<ZoneGeometryRow>,
    ) -> ReconcileOutcome {
        let mut issues = Vec::new();
        let mut summary = ReconcileSummary {
            lookup_rows_in: lookup_rows.len() as u64,
            geometry_rows_in: geometry_rows.len() as u64,
            ..ReconcileSummary::default()
        };

        let lookup = self.validate_lookup(lookup_rows, &mut issues);
        let geometry_counts = self.count_geometry(geometry_rows, &mut issues, &mut summary);

        summary.unique_geometry_ids = geometry_counts.len() as u64;

        let mut zones: Vec<ZoneRecord> = lookup
            .into_iter()
            .map(|(location_id, row)| {
                let geometry_record_count = geometry_counts.get(&location_id).copied().unwrap_or(0);
                let has_geometry = geometry_record_count > 0;
                let map_status = if has_geometry {
                    MapStatus::Mappable
                } else {
                    issues.push(QualityLogEntry::new(
                        Dataset::ZoneLookup,
                        location_id.to_string(),
                        IssueType::MissingGeometry,
                        LogAction::RetainedNonMappable,
                        "no geometry metadata for this location id",
                    ));
                    summary.missing_geometry_ids.push(location_id);
                    MapStatus::MissingGeometry
                };

                ZoneRecord {
                    location_id,
                    borough: row.borough,
                    zone: row.zone,
                    service_zone: row.service_zone,
                    has_geometry,
                    geometry_record_count,
                    map_status,
                }
            })
            .collect();

        zones.sort_by_key(|zone| zone.location_id);
        summary.missing_geometry_ids.sort_unstable();
        summary.zones_out = zones.len() as u64;

        info!(
            zones = summary.zones_out,
            missing_geometry = summary.missing_geometry_ids.len(),
            duplicate_geometry_removed = summary.duplicate_geometry_removed,
            issues = issues.len(),
            "zone reconciliation complete"
        );

        ReconcileOutcome {
            dimension: ZoneDimension::new(zones),
            issues,
            summary,
        }
    }

    /// Validates and dedups lookup rows. First occurrence of a location id
    /// wins; later ones are excluded and logged.
    fn validate_lookup(
        &self,
        rows: Vec<ZoneLookupRow>,
        issues: &mut Vec<QualityLogEntry>,
    ) -> Vec<(u32, ZoneLookupRow)> {
        let mut seen: HashSet<u32> = HashSet::new();
        let mut surviving = Vec::new();

        for row in rows {
            let row = ZoneLookupRow {
                location_id: row.location_id.trim().to_string(),
                borough: row.borough.trim().to_string(),
                zone: row.zone.trim().to_string(),
                service_zone: row.service_zone.trim().to_string(),
            };

            let location_id = match parse_location_id(&row.location_id) {
                Some(id) => id,
                None => {
                    issues.push(QualityLogEntry::new(
                        Dataset::ZoneLookup,
                        row.location_id.clone(),
                        IssueType::InvalidLocationId,
                        LogAction::Excluded,
                        format!("'{}' is not a positive integer", row.location_id),
                    ));
                    continue;
                }
            };

            if row.borough.is_empty() || row.zone.is_empty() || row.service_zone.is_empty() {
                issues.push(QualityLogEntry::new(
                    Dataset::ZoneLookup,
                    location_id.to_string(),
                    IssueType::BlankTextValue,
                    LogAction::Excluded,
                    "blank borough, zone, or service zone",
                ));
                continue;
            }

            if !seen.insert(location_id) {
                issues.push(QualityLogEntry::new(
                    Dataset::ZoneLookup,
                    location_id.to_string(),
                    IssueType::DuplicateLocationId,
                    LogAction::Excluded,
                    "location id already seen; first occurrence wins",
                ));
                continue;
            }

            surviving.push((location_id, row));
        }

        surviving
    }

    /// Validates geometry rows and counts survivors per location id.
    /// Ids with more than one row keep a single logical record; the excess
    /// count is logged but the total stays visible on the zone.
    fn count_geometry(
        &self,
        rows: Vec<ZoneGeometryRow>,
        issues: &mut Vec<QualityLogEntry>,
        summary: &mut ReconcileSummary,
    ) -> HashMap<u32, u32> {
        let mut counts: HashMap<u32, u32> = HashMap::new();

        for row in rows {
            let trimmed_id = row.location_id.trim();
            let trimmed_borough = row.borough.trim();
            let trimmed_zone = row.zone.trim();
            let trimmed_service = row.service_zone.trim();

            let padded = trimmed_id != row.location_id
                || trimmed_borough != row.borough
                || trimmed_zone != row.zone
                || trimmed_service != row.service_zone;
            if padded {
                issues.push(QualityLogEntry::new(
                    Dataset::ZoneGeometry,
                    trimmed_id.to_string(),
                    IssueType::FixedWidthPadding,
                    LogAction::Retained,
                    "fixed-width padding trimmed from one or more fields",
                ));
            }

            match parse_location_id(trimmed_id) {
                Some(id) => *counts.entry(id).or_insert(0) += 1,
                None => {
                    issues.push(QualityLogEntry::new(
                        Dataset::ZoneGeometry,
                        trimmed_id.to_string(),
                        IssueType::InvalidLocationId,
                        LogAction::Excluded,
                        format!("'{}' is not a positive integer", trimmed_id),
                    ));
                }
            }
        }

        for (&location_id, &count) in &counts {
            if count > 1 {
                let removed = count - 1;
                debug!(location_id, removed, "duplicate geometry metadata");
                summary.duplicate_geometry_removed += u64::from(removed);
                issues.push(QualityLogEntry::new(
                    Dataset::ZoneGeometry,
                    location_id.to_string(),
                    IssueType::DuplicateShapeMetadata,
                    LogAction::Retained,
                    format!("{} duplicate geometry record(s) removed", removed),
                ));
            }
        }

        counts
    }
}

/// Parses a location id, accepting only positive integers.
fn parse_location_id(raw: &str) -> Option<u32> {
    match raw.parse::<u32>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}
