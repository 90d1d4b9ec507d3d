//! Input adapters handing raw row shapes to the core.

mod reader;

pub use reader::{read_zone_geometry, read_zone_lookup, TripRowReader};
