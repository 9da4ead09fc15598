//! Single-pass reference: aggregates the whole input without partitions or
//! worker threads. Its output must match `pharmacy-counting` for any worker count.

use std::path::PathBuf;

use clap::Parser;
use pharmacy_common::{
    build_report, ensure_input_exists, logging::init_logger, record::FIRST_DATA_LINE,
    save_report, AggregateMap, CostStyle, RecordReader,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "pharmacy-sequential")]
struct Cli {
    input: PathBuf,
    output: PathBuf,
    /// Print total_cost with exactly two decimals
    #[arg(long)]
    fixed_decimals: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logger(Level::INFO);
    ensure_input_exists(&cli.input)?;

    info!("Processing {}", cli.input.display());
    let records = RecordReader::open(&cli.input, &cli.input, FIRST_DATA_LINE)?;
    let map = AggregateMap::try_from_records(records)?;
    info!("{} records, {} drugs", map.record_count(), map.len());

    let style = if cli.fixed_decimals {
        CostStyle::Fixed
    } else {
        CostStyle::Shortest
    };
    save_report(&cli.output, &build_report(map), style)?;
    info!("Saved report to {}", cli.output.display());
    Ok(())
}
