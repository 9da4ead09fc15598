//! Record model and the map/reduce steps of the pharmacy counting report.
//!
//! A partition's records are folded into an [`AggregateMap`], partial maps are
//! combined with [`AggregateMap::merge`], and [`build_report`] turns the final
//! map into ordered [`ReportRow`]s.

use std::path::Path;

pub mod aggregate;
pub mod error;
pub mod logging;
pub mod record;
pub mod report;

pub use aggregate::{AggregateMap, DrugAggregate};
pub use error::{Error, Result};
pub use record::{PrescriberKey, Record, RecordReader};
pub use report::{build_report, save_report, write_report, CostStyle, ReportRow};

pub fn ensure_input_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::MissingInput {
            path: path.to_path_buf(),
        })
    }
}
