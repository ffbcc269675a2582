//! Read-only queries against the externally owned `sites` / `site_data` tables.
//!
//! Every function takes the connection explicitly so callers decide which
//! request scope the work belongs to.

mod catalog;
mod readings;

pub use catalog::{list_sites, Site};
pub use readings::{day_start, fetch_readings, time_bounds, Reading, ReadingSet};
