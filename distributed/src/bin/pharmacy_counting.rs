use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pharmacy_common::{ensure_input_exists, logging::init_logger, CostStyle};
use pharmacy_distributed::{default_workers, run, temp_work_dir, PipelineConfig};
use tracing::{info, Level};

/// Per-drug prescriber counts and total cost, aggregated in parallel.
#[derive(Parser, Debug)]
#[command(name = "pharmacy-counting")]
pub struct Cli {
    /// Input CSV: id,prescriber_last_name,prescriber_first_name,drug_name,drug_cost
    input: PathBuf,
    /// Output CSV: drug_name,num_prescriber,total_cost
    output: PathBuf,
    /// Number of partitions and workers [default: available parallelism]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,
    /// Directory for part files [default: a fresh directory under the system temp dir]
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Leave the part files in place after a successful run
    #[arg(long)]
    keep_parts: bool,
    /// Print total_cost with exactly two decimals
    #[arg(long)]
    fixed_decimals: bool,
    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let workers = self
            .workers
            .and_then(|n| usize::try_from(n).ok())
            .and_then(std::num::NonZeroUsize::new)
            .unwrap_or_else(default_workers);
        PipelineConfig {
            input: self.input,
            output: self.output,
            workers,
            work_dir: self.work_dir.unwrap_or_else(temp_work_dir),
            keep_parts: self.keep_parts,
            cost_style: if self.fixed_decimals {
                CostStyle::Fixed
            } else {
                CostStyle::Shortest
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logger(if cli.verbose { Level::DEBUG } else { Level::INFO });
    ensure_input_exists(&cli.input)?;

    let config = cli.into_config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(run(&config))?;
    info!(
        "Wrote {} ({} drugs from {} partitions)",
        summary.output.display(),
        summary.drugs,
        summary.partitions
    );
    Ok(())
}
