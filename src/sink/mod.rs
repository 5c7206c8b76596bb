//! Table sink: overwrite one table with derived rows as partitioned Parquet.
//!
//! Layout under the output root:
//!
//! ```text
//! <table>/<k1>=<v1>/<k2>=<v2>/part-00000-<uuid>.snappy.parquet
//! <table>/_SUCCESS
//! ```
//!
//! The marker is written last, so a table directory without `_SUCCESS` is
//! incomplete.

pub mod parquet;
pub mod partition;

pub use self::parquet::ParquetEncoder;
pub use partition::{DEFAULT_PARTITION, Partition};

use arrow::array::RecordBatch;
use futures::{StreamExt, TryStreamExt, stream};
use object_store::PutPayload;
use object_store::path::{Path, PathPart};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::emit;
use crate::error::{ClearTableSnafu, EncodeTaskSnafu, PartitionSnafu, PutObjectSnafu, WriteError};
use crate::metrics::events::{ParquetFileWritten, TableCleared, TableWriteCompleted};
use crate::schema::Table;
use crate::storage::StorageProviderRef;

/// Name of the completion marker.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Information about a completed Parquet file.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// The path to the file, relative to the output root.
    pub path: Path,
    /// The size of the file in bytes.
    pub size: usize,
    /// Number of records in the file.
    pub record_count: usize,
    /// Partition values of the file's directory, outermost first.
    pub partition_values: Vec<(String, String)>,
}

/// Outcome of one table overwrite.
#[derive(Debug, Clone)]
pub struct TableWriteStats {
    pub table: Table,
    pub rows: usize,
    pub partitions: usize,
    /// Objects removed from the previous run.
    pub deleted: usize,
    /// Files written, ordered by path.
    pub files: Vec<FinishedFile>,
}

impl TableWriteStats {
    pub fn bytes(&self) -> usize {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// One file waiting to be encoded.
struct PendingFile {
    path: Path,
    batch: RecordBatch,
    partition_values: Vec<(String, String)>,
}

/// Writes whole tables below the output root.
#[derive(Debug, Clone)]
pub struct TableSink {
    storage: StorageProviderRef,
    encoder: Arc<ParquetEncoder>,
    max_concurrent_writes: usize,
    max_rows_per_file: Option<usize>,
}

impl TableSink {
    pub fn new(storage: StorageProviderRef, config: &OutputConfig) -> Self {
        Self {
            storage,
            encoder: Arc::new(ParquetEncoder::new(config.compression)),
            max_concurrent_writes: config.max_concurrent_writes.max(1),
            max_rows_per_file: config.max_rows_per_file,
        }
    }

    /// Replace everything under `<table>/` with `batches`, partitioned by the
    /// table's partition columns. The batches must have the table schema.
    pub async fn overwrite(
        &self,
        table: Table,
        batches: Vec<RecordBatch>,
    ) -> Result<TableWriteStats, WriteError> {
        let start = Instant::now();
        let prefix = table.name();

        let deleted = self
            .storage
            .delete_prefix(prefix)
            .await
            .context(ClearTableSnafu { prefix })?;
        emit!(TableCleared {
            table,
            objects: deleted as u64,
        });
        if deleted > 0 {
            debug!("Removed {} objects from previous {} output", deleted, table);
        }

        let rows = batches.iter().map(RecordBatch::num_rows).sum();
        let encoder = self.encoder.clone();
        let max_rows = self.max_rows_per_file;
        let (partitions, pending) =
            tokio::task::spawn_blocking(move || plan_files(table, &batches, &encoder, max_rows))
                .await
                .context(EncodeTaskSnafu)??;

        let mut files: Vec<FinishedFile> = stream::iter(pending)
            .map(|file| self.write_file(table, file))
            .buffer_unordered(self.max_concurrent_writes)
            .try_collect()
            .await?;
        files.sort_by_key(|f| f.path.to_string());

        let marker = Path::from(prefix).child(SUCCESS_MARKER);
        self.storage
            .put_payload(&marker, PutPayload::new())
            .await
            .context(PutObjectSnafu {
                path: marker.to_string(),
            })?;

        let stats = TableWriteStats {
            table,
            rows,
            partitions,
            deleted,
            files,
        };
        emit!(TableWriteCompleted {
            table,
            duration: start.elapsed(),
        });
        info!(
            "Wrote {} rows to {} ({} partitions, {} files, {} bytes)",
            stats.rows,
            table,
            stats.partitions,
            stats.files.len(),
            stats.bytes()
        );
        Ok(stats)
    }

    async fn write_file(&self, table: Table, file: PendingFile) -> Result<FinishedFile, WriteError> {
        let encoder = self.encoder.clone();
        let PendingFile {
            path,
            batch,
            partition_values,
        } = file;
        let record_count = batch.num_rows();

        let bytes = tokio::task::spawn_blocking(move || encoder.encode(&batch))
            .await
            .context(EncodeTaskSnafu)??;
        let size = bytes.len();

        self.storage
            .put_payload(&path, PutPayload::from(bytes))
            .await
            .context(PutObjectSnafu {
                path: path.to_string(),
            })?;
        emit!(ParquetFileWritten {
            table,
            rows: record_count as u64,
            bytes: size as u64,
        });
        debug!("Wrote {} ({} rows, {} bytes)", path, record_count, size);

        Ok(FinishedFile {
            path,
            size,
            record_count,
            partition_values,
        })
    }
}

/// Split a table's rows into the files of one write. Returns the partition
/// count alongside the files, numbered in partition order.
fn plan_files(
    table: Table,
    batches: &[RecordBatch],
    encoder: &ParquetEncoder,
    max_rows_per_file: Option<usize>,
) -> Result<(usize, Vec<PendingFile>), WriteError> {
    let columns = table.partition_columns();
    let batch = arrow::compute::concat_batches(&table.schema(), batches).context(
        PartitionSnafu {
            columns: columns.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        },
    )?;

    let partitions = partition::split(&batch, &columns)?;
    let mut pending = Vec::new();
    for part in &partitions {
        let directory = part.directory(table.name());
        for chunk in part.chunks(max_rows_per_file) {
            let name = encoder.file_name(pending.len());
            pending.push(PendingFile {
                path: directory.child(PathPart::from(name)),
                batch: chunk,
                partition_values: part.values.clone(),
            });
        }
    }
    Ok((partitions.len(), pending))
}
