//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which records the corresponding
//! Prometheus metric. Without an installed recorder they only trace.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use crate::schema::{PipelineKind, Table};

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

fn pipeline_label(pipeline: PipelineKind) -> &'static str {
    match pipeline {
        PipelineKind::SongCatalog => "song_catalog",
        PipelineKind::LogEvents => "log_events",
    }
}

// ============================================================================
// Source events
// ============================================================================

/// Event emitted when raw (possibly compressed) bytes are fetched.
pub struct BytesRead {
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes read");
        counter!("songlake_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when one source file has been decoded.
pub struct SourceFileRead {
    pub pipeline: PipelineKind,
    pub records: u64,
}

impl InternalEvent for SourceFileRead {
    fn emit(self) {
        let pipeline = pipeline_label(self.pipeline);
        trace!(pipeline, records = self.records, "Source file read");
        counter!("songlake_files_read_total", "pipeline" => pipeline).increment(1);
        counter!("songlake_records_read_total", "pipeline" => pipeline).increment(self.records);
    }
}

/// Event emitted when a file download completes.
pub struct FileDownloadCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDownloadCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File download completed"
        );
        histogram!("songlake_file_download_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when decompression and JSON decoding of a file completes.
pub struct FileDecodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for FileDecodeCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "File decode completed"
        );
        histogram!("songlake_file_decode_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the number of active downloads changes.
pub struct ActiveDownloads {
    pub count: usize,
}

impl InternalEvent for ActiveDownloads {
    fn emit(self) {
        trace!(count = self.count, "Active downloads");
        gauge!("songlake_active_downloads").set(self.count as f64);
    }
}

// ============================================================================
// Table events
// ============================================================================

/// Event emitted when a table's plan has been evaluated.
pub struct TableDerived {
    pub table: Table,
    pub rows: u64,
    pub duration: Duration,
}

impl InternalEvent for TableDerived {
    fn emit(self) {
        let table = self.table.name();
        trace!(
            table,
            rows = self.rows,
            duration_ms = self.duration.as_millis(),
            "Table derived"
        );
        histogram!("songlake_transform_duration_seconds", "table" => table)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when previous table contents are removed.
pub struct TableCleared {
    pub table: Table,
    pub objects: u64,
}

impl InternalEvent for TableCleared {
    fn emit(self) {
        let table = self.table.name();
        trace!(table, objects = self.objects, "Table cleared");
        counter!("songlake_objects_deleted_total", "table" => table).increment(self.objects);
    }
}

/// Event emitted when one Parquet file has been uploaded.
pub struct ParquetFileWritten {
    pub table: Table,
    pub rows: u64,
    pub bytes: u64,
}

impl InternalEvent for ParquetFileWritten {
    fn emit(self) {
        let table = self.table.name();
        trace!(table, rows = self.rows, bytes = self.bytes, "Parquet file written");
        counter!("songlake_files_written_total", "table" => table).increment(1);
        counter!("songlake_rows_written_total", "table" => table).increment(self.rows);
        counter!("songlake_bytes_written_total", "table" => table).increment(self.bytes);
    }
}

/// Event emitted when Parquet encoding of one file completes.
pub struct ParquetEncodeCompleted {
    pub duration: Duration,
}

impl InternalEvent for ParquetEncodeCompleted {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Parquet encode completed"
        );
        histogram!("songlake_parquet_encode_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a table write finishes, marker included.
pub struct TableWriteCompleted {
    pub table: Table,
    pub duration: Duration,
}

impl InternalEvent for TableWriteCompleted {
    fn emit(self) {
        let table = self.table.name();
        trace!(
            table,
            duration_ms = self.duration.as_millis(),
            "Table write completed"
        );
        histogram!("songlake_table_write_duration_seconds", "table" => table)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Delete,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Delete => "delete",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "songlake_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "songlake_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Run events
// ============================================================================

/// Event emitted once per run.
pub struct RunCompleted {
    pub success: bool,
    pub duration: Duration,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(
            status,
            duration_ms = self.duration.as_millis(),
            "Run completed"
        );
        counter!("songlake_runs_total", "status" => status).increment(1);
        histogram!("songlake_run_duration_seconds").record(self.duration.as_secs_f64());
    }
}
