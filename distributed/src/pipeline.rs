use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use futures::future::try_join_all;
use itertools::Itertools;
use pharmacy_common::{
    build_report, save_report, AggregateMap, CostStyle, Error, RecordReader, Result,
};
use tokio::task::{self, JoinError};
use tracing::{info, warn};

use crate::{
    chunker::{self, Partition},
    temp_work_dir,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub workers: NonZeroUsize,
    pub work_dir: PathBuf,
    pub keep_parts: bool,
    pub cost_style: CostStyle,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            workers: default_workers(),
            work_dir: temp_work_dir(),
            keep_parts: false,
            cost_style: CostStyle::default(),
        }
    }
}

pub fn default_workers() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub partitions: usize,
    pub records: u64,
    pub drugs: usize,
    pub output: PathBuf,
    pub elapsed: Duration,
}

fn join_error(task: String, err: JoinError) -> Error {
    let message = if err.is_panic() {
        "worker panicked".to_string()
    } else {
        err.to_string()
    };
    Error::Worker { task, message }
}

/// Map step for one partition. Runs on the blocking pool.
pub fn aggregate_partition(partition: &Partition, source: &Path) -> Result<AggregateMap> {
    info!("Processing part file: {}", partition.path.display());
    let records = RecordReader::open(&partition.path, source, partition.first_line)?;
    let map = AggregateMap::try_from_records(records)?;
    info!(
        "Finished part {}: {} records, {} drugs",
        partition.index + 1,
        map.record_count(),
        map.len()
    );
    Ok(map)
}

/// Aggregates every partition on its own blocking task and waits for all of them.
///
/// Results come back in partition order. The first failure ends the wait;
/// tasks still running are left to finish and their results are dropped.
pub async fn aggregate_partitions(
    partitions: &[Partition],
    source: &Path,
) -> Result<Vec<AggregateMap>> {
    let tasks = partitions
        .iter()
        .cloned()
        .map(|partition| {
            let source = source.to_path_buf();
            let name = format!("partition {}", partition.index + 1);
            let handle = task::spawn_blocking(move || aggregate_partition(&partition, &source));
            async move { handle.await.map_err(|err| join_error(name, err))? }
        })
        .collect_vec();
    try_join_all(tasks).await
}

async fn split(config: &PipelineConfig) -> Result<Vec<Partition>> {
    let input = config.input.clone();
    let work_dir = config.work_dir.clone();
    let workers = config.workers.get();
    task::spawn_blocking(move || chunker::split_input(&input, &work_dir, workers))
        .await
        .map_err(|err| join_error("chunker".to_string(), err))?
}

async fn reduce_and_report(
    config: &PipelineConfig,
    partials: Vec<AggregateMap>,
) -> Result<(u64, usize)> {
    let output = config.output.clone();
    let style = config.cost_style;
    task::spawn_blocking(move || -> Result<(u64, usize)> {
        info!("Merging partial aggregates and generating report");
        let merged = AggregateMap::merge_all(partials);
        let stats = (merged.record_count(), merged.len());
        let rows = build_report(merged);
        save_report(&output, &rows, style)?;
        info!("Saved report: {}", output.display());
        Ok(stats)
    })
    .await
    .map_err(|err| join_error("reducer".to_string(), err))?
}

/// Chunk, aggregate in parallel, merge, write the report, then clean up.
///
/// Part files are only removed once the report has been written. On failure
/// they stay in `config.work_dir`.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let started = Instant::now();
    info!(
        "Pharmacy counting begins with {} workers",
        config.workers.get()
    );

    let partitions = split(config).await?;
    let outcome = match aggregate_partitions(&partitions, &config.input).await {
        Ok(partials) => reduce_and_report(config, partials).await,
        Err(err) => Err(err),
    };
    let (records, drugs) = match outcome {
        Ok(stats) => stats,
        Err(err) => {
            warn!(
                "Run failed, part files left in {}",
                config.work_dir.display()
            );
            return Err(err);
        }
    };

    if config.keep_parts {
        info!("Keeping part files in {}", config.work_dir.display());
    } else {
        chunker::remove_partitions(&config.work_dir, &partitions)?;
    }

    let summary = RunSummary {
        partitions: partitions.len(),
        records,
        drugs,
        output: config.output.clone(),
        elapsed: started.elapsed(),
    };
    info!(
        "Pharmacy counting complete: {} records, {} drugs in {:?}",
        summary.records, summary.drugs, summary.elapsed
    );
    Ok(summary)
}
