//! One batch run: read both sources, derive the five tables, overwrite them.
//!
//! # Architecture
//!
//! - **Tokio tasks**: list and download source files, upload Parquet files (I/O bound)
//! - **DataFusion**: each table is a [`DataFrame`] plan over the two sources,
//!   executed on the runtime's worker threads
//! - **Tokio's blocking thread pool**: decode JSON, encode Parquet (CPU bound)
//!
//! The two source reads run concurrently. All five tables are derived
//! before any table is written, so a failed derivation leaves the previous
//! run's output untouched. The writes then run concurrently since they
//! target disjoint prefixes. Any failure aborts the run.

pub mod logs;
pub mod songplays;
pub mod songs;

#[cfg(test)]
mod fixtures;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use chrono::{DateTime, Utc};
use datafusion::dataframe::DataFrame;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::prelude::{Expr, SessionConfig, SessionContext, cast};
use futures::future::try_join_all;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::emit;
use crate::error::{
    ConfigSnafu, ConformSnafu, ExecuteSnafu, InputSnafu, InvalidPatternSnafu, OpenOutputSnafu,
    OpenSourceSnafu, OutputSnafu, PipelineError, PlanSnafu, SourceReadSnafu, TableWriteSnafu,
    TransformError, TransformSnafu,
};
use crate::metrics::events::{RunCompleted, TableDerived};
use crate::schema::{Column, LogField, PipelineKind, SongField, Table, TableColumns};
use crate::sink::{TableSink, TableWriteStats};
use crate::source::{Glob, NdjsonReaderConfig, SourceReader};
use crate::storage::StorageProvider;

/// Statistics about one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Catalog records read, before deduplication.
    pub song_records: usize,
    /// Log events read, before filtering.
    pub log_records: usize,
    /// One entry per table, in [`Table::ALL`] order.
    pub tables: Vec<TableWriteStats>,
}

impl RunStats {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn table(&self, table: Table) -> Option<&TableWriteStats> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn rows_written(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn files_written(&self) -> usize {
        self.tables.iter().map(|t| t.files.len()).sum()
    }

    pub fn bytes_written(&self) -> usize {
        self.tables.iter().map(TableWriteStats::bytes).sum()
    }
}

/// Input files a run would read.
#[derive(Debug, Clone)]
pub struct Survey {
    pub input: String,
    pub song_files: usize,
    pub log_files: usize,
}

/// Decoded rows of both sources.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub catalog: Vec<RecordBatch>,
    pub logs: Vec<RecordBatch>,
}

impl Sources {
    pub fn song_records(&self) -> usize {
        self.catalog.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn log_records(&self) -> usize {
        self.logs.iter().map(RecordBatch::num_rows).sum()
    }
}

/// Expose in-memory batches of `schema` as a dataframe.
pub fn dataframe(
    ctx: &SessionContext,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
) -> Result<DataFrame, DataFusionError> {
    let table = MemTable::try_new(schema, vec![batches])?;
    ctx.read_table(Arc::new(table))
}

/// Project onto the columns of `C` with their declared types, sorted by
/// every column so identical inputs give identical output.
pub(crate) fn conform<C: TableColumns>(df: DataFrame) -> Result<DataFrame, DataFusionError> {
    let columns = C::all();
    df.select(
        columns
            .iter()
            .map(|c| cast(c.col(), c.data_type()).alias(c.name()))
            .collect::<Vec<Expr>>(),
    )?
    .sort(columns.iter().map(|c| c.col().sort(true, true)).collect())
}

/// The plan deriving `table` from both sources.
pub fn table_plan(
    ctx: &SessionContext,
    table: Table,
    sources: &Sources,
    config: &Config,
) -> Result<DataFrame, DataFusionError> {
    let catalog = || dataframe(ctx, SongField::schema(), sources.catalog.clone());
    let decorated = || {
        let events = dataframe(ctx, LogField::schema(), sources.logs.clone())?;
        logs::decorate_timestamps(events)
    };

    match table {
        Table::Songs => songs::extract_songs(catalog()?),
        Table::Artists => songs::extract_artists(catalog()?),
        Table::Users => logs::extract_users(
            logs::next_song_events(decorated()?)?,
            config.users.level_policy,
        ),
        Table::Time => logs::extract_time(decorated()?),
        Table::Songplays => songplays::extract_songplays(
            logs::next_song_events(decorated()?)?,
            catalog()?,
            config.songplays.match_mode,
        ),
    }
}

/// Plans for every table, in [`Table::ALL`] order.
pub fn table_plans(
    ctx: &SessionContext,
    sources: &Sources,
    config: &Config,
) -> Result<Vec<(Table, DataFrame)>, PipelineError> {
    Table::ALL
        .into_iter()
        .map(|table| {
            let plan = table_plan(ctx, table, sources, config)
                .context(PlanSnafu)
                .context(TransformSnafu {
                    pipeline: table.pipeline(),
                    table,
                })?;
            Ok((table, plan))
        })
        .collect()
}

/// Execute a table plan into batches carrying exactly the table schema.
pub async fn materialize(table: Table, plan: DataFrame) -> Result<Vec<RecordBatch>, TransformError> {
    let schema = table.schema();
    plan.collect()
        .await
        .context(ExecuteSnafu)?
        .into_iter()
        .map(|batch| {
            RecordBatch::try_new(schema.clone(), batch.columns().to_vec()).context(ConformSnafu)
        })
        .collect()
}

/// Compile both source patterns.
fn globs(config: &Config) -> Result<(Glob, Glob), PipelineError> {
    let compile = |pattern: &str| {
        Glob::new(pattern)
            .context(InvalidPatternSnafu { pattern })
            .context(ConfigSnafu)
    };
    Ok((
        compile(&config.input.song_pattern)?,
        compile(&config.input.log_pattern)?,
    ))
}

async fn open_source(config: &Config) -> Result<SourceReader, PipelineError> {
    let storage = StorageProvider::for_url_with_options(
        &config.input.path,
        config.input_storage_options(),
    )
    .await
    .context(OpenSourceSnafu)
    .context(InputSnafu)?;

    Ok(SourceReader::new(
        Arc::new(storage),
        NdjsonReaderConfig::new(config.input.batch_size, config.input.compression),
        config.input.max_concurrent_files,
    ))
}

/// List the files a run would read without reading or writing anything.
pub async fn survey(config: &Config) -> Result<Survey, PipelineError> {
    let source = open_source(config).await?;
    let (song_glob, log_glob) = globs(config)?;

    let (song_files, log_files) = tokio::try_join!(
        async {
            source
                .list(&song_glob)
                .await
                .context(SourceReadSnafu {
                    pipeline: PipelineKind::SongCatalog,
                })
        },
        async {
            source.list(&log_glob).await.context(SourceReadSnafu {
                pipeline: PipelineKind::LogEvents,
            })
        },
    )?;

    Ok(Survey {
        input: config.input.path.clone(),
        song_files: song_files.len(),
        log_files: log_files.len(),
    })
}

/// Run the batch job with the given configuration.
pub async fn run(config: Config) -> Result<RunStats, PipelineError> {
    let start = Instant::now();
    let result = execute(&config).await;
    emit!(RunCompleted {
        success: result.is_ok(),
        duration: start.elapsed(),
    });
    result
}

async fn execute(config: &Config) -> Result<RunStats, PipelineError> {
    let started_at = Utc::now();

    let source = open_source(config).await?;
    let (song_glob, log_glob) = globs(config)?;

    let (catalog, logs) = tokio::try_join!(
        async {
            source
                .read(PipelineKind::SongCatalog, &song_glob, SongField::schema())
                .await
                .context(SourceReadSnafu {
                    pipeline: PipelineKind::SongCatalog,
                })
        },
        async {
            source
                .read(PipelineKind::LogEvents, &log_glob, LogField::schema())
                .await
                .context(SourceReadSnafu {
                    pipeline: PipelineKind::LogEvents,
                })
        },
    )?;
    let sources = Sources { catalog, logs };
    let song_records = sources.song_records();
    let log_records = sources.log_records();
    info!(
        "Read {} song records and {} log events",
        song_records, log_records
    );

    let output = StorageProvider::for_output_with_options(
        &config.output.path,
        config.output_storage_options(),
    )
    .await
    .context(OpenOutputSnafu)
    .context(OutputSnafu)?;
    let sink = TableSink::new(Arc::new(output), &config.output);

    let ctx = SessionContext::new_with_config(
        SessionConfig::new().with_batch_size(config.input.batch_size),
    );
    let plans = table_plans(&ctx, &sources, config)?;
    let derived = try_join_all(plans.into_iter().map(|(table, plan)| derive(table, plan))).await?;

    let tables = try_join_all(
        derived
            .into_iter()
            .map(|(table, batches)| write(&sink, table, batches)),
    )
    .await?;

    let stats = RunStats {
        started_at,
        finished_at: Utc::now(),
        song_records,
        log_records,
        tables,
    };
    debug!(
        "Run finished in {} ms",
        stats.duration().num_milliseconds()
    );
    Ok(stats)
}

async fn derive(table: Table, plan: DataFrame) -> Result<(Table, Vec<RecordBatch>), PipelineError> {
    let start = Instant::now();
    let batches = materialize(table, plan)
        .await
        .context(TransformSnafu {
            pipeline: table.pipeline(),
            table,
        })?;

    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    emit!(TableDerived {
        table,
        rows: rows as u64,
        duration: start.elapsed(),
    });
    debug!("Derived {} rows for {}", rows, table);
    Ok((table, batches))
}

async fn write(
    sink: &TableSink,
    table: Table,
    batches: Vec<RecordBatch>,
) -> Result<TableWriteStats, PipelineError> {
    sink.overwrite(table, batches)
        .await
        .context(TableWriteSnafu {
            pipeline: table.pipeline(),
            table,
        })
}
