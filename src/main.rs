//! songlake: builds a star schema of partitioned Parquet tables from
//! song catalog and listening-log JSON dumps.
//!
//! Reads newline-delimited JSON from S3 or the local filesystem and
//! overwrites the `songs`, `artists`, `users`, `time` and `songplays`
//! tables under the output root.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use songlake::config::Config;
use songlake::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use songlake::{metrics, run, survey};

/// Song catalog and listening logs to a Parquet star schema.
#[derive(Parser, Debug)]
#[command(name = "songlake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration and list input files without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("songlake starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Input: {}", config.input.path);
        info!("Output: {}", config.output.path);
        info!("Songplays match mode: {:?}", config.songplays.match_mode);
        info!("Users level policy: {:?}", config.users.level_policy);
        let survey = survey(&config).await?;
        info!(
            "{} song files and {} log files under {}",
            survey.song_files, survey.log_files, survey.input
        );
        if survey.song_files == 0 || survey.log_files == 0 {
            warn!("A run with this configuration would fail: no input files matched");
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run(config).await?;

    info!("Run completed successfully");
    info!("  Song records read: {}", stats.song_records);
    info!("  Log events read: {}", stats.log_records);
    for table in &stats.tables {
        info!(
            "  {}: {} rows in {} partitions",
            table.table, table.rows, table.partitions
        );
    }
    info!("  Parquet files written: {}", stats.files_written());
    info!("  Bytes written: {}", stats.bytes_written());
    info!("  Duration: {} ms", stats.duration().num_milliseconds());

    Ok(())
}
