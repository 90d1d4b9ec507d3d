//! Zone reconciliation: merging the zone name lookup and geometry metadata
//! reference datasets into one canonical, fully-audited zone dimension.

mod reconciler;
mod types;

pub use reconciler::{ReconcileOutcome, ZoneReconciler};
pub use types::{
    MapStatus, ReconcileSummary, ZoneDimension, ZoneGeometryRow, ZoneLookupRow, ZoneRecord,
};
