//! Parallel driver for the pharmacy counting report: the input is split into
//! part files, each part is aggregated on its own worker, and the partial
//! aggregates are merged into one report.

use std::{env, path::PathBuf};
use uuid::Uuid;

pub mod chunker;
pub mod pipeline;

pub use pipeline::{default_workers, run, PipelineConfig, RunSummary};

const WORK_DIR_PREFIX: &str = "pharmacy-counting";

/// A fresh, not yet created directory under the system temp dir for one run's part files.
pub fn temp_work_dir() -> PathBuf {
    env::temp_dir().join(format!("{WORK_DIR_PREFIX}-{}", Uuid::new_v4()))
}
