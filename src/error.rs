//! Error types for songlake using snafu.
//!
//! Every failure is fatal at run level. The leaf enums follow the run's
//! phases (configuration, source read, transformation, write) and
//! [`PipelineError`] attaches the pipeline and table that was being produced.

use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use snafu::prelude::*;

use crate::schema::{PipelineKind, Table};

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {path}"))]
    ReadFile {
        source: std::io::Error,
        path: String,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// A location string is empty.
    #[snafu(display("{name} cannot be empty"))]
    EmptyLocation { name: &'static str },

    /// A location string is not a supported storage URL.
    #[snafu(display("{name} is not a supported storage location"))]
    InvalidLocation {
        name: &'static str,
        source: StorageError,
    },

    /// A credential required by an S3 location is absent.
    #[snafu(display("Missing credential {name} (required for S3 locations)"))]
    MissingCredential { name: &'static str },

    /// A credential is present but malformed.
    #[snafu(display("Invalid credential {name}: {reason}"))]
    InvalidCredential {
        name: &'static str,
        reason: &'static str,
    },

    /// A source file pattern does not compile.
    #[snafu(display("Invalid source pattern {pattern:?}"))]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// A numeric option is out of range.
    #[snafu(display("{name} must be greater than zero"))]
    ZeroOption { name: &'static str },
}

// ============ Reader Errors ============

/// Errors that can occur while reading a JSON source (SourceReadError).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The source location could not be opened.
    #[snafu(display("Failed to open source location"))]
    OpenSource { source: StorageError },

    /// Listing the source location failed.
    #[snafu(display("Failed to list files for {pattern}"))]
    ListFiles {
        pattern: String,
        source: StorageError,
    },

    /// The glob pattern matched nothing.
    #[snafu(display("No input files matched {pattern}"))]
    NoInputFiles { pattern: String },

    /// Downloading a source object failed.
    #[snafu(display("Failed to fetch {path}"))]
    FetchFile { path: String, source: StorageError },

    /// Gzip decompression failed.
    #[snafu(display("Gzip decompression failed for {path}"))]
    GzipDecompression {
        source: std::io::Error,
        path: String,
    },

    /// Failed to build JSON decoder.
    #[snafu(display("Failed to build JSON decoder: {message}"))]
    DecoderBuild { message: String },

    /// Failed to decode JSON into the fixed schema.
    #[snafu(display("Failed to decode JSON for {path}: {message}"))]
    JsonDecode { path: String, message: String },

    /// The blocking decode task panicked or was cancelled.
    #[snafu(display("Decode task failed"))]
    DecodeTask { source: tokio::task::JoinError },
}

// ============ Transform Errors ============

/// Errors raised while planning or executing a table derivation
/// (TransformationError).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The plan does not resolve against its inputs, e.g. an unknown column.
    #[snafu(display("Failed to plan derivation"))]
    Plan { source: DataFusionError },

    /// Executing the plan failed, e.g. a cast of a non-numeric timestamp.
    #[snafu(display("Failed to execute derivation"))]
    Execute { source: DataFusionError },

    /// Derived rows do not fit the table schema.
    #[snafu(display("Derived rows do not match the table schema"))]
    Conform { source: ArrowError },
}

// ============ Write Errors ============

/// Errors raised while writing a table (WriteError).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WriteError {
    /// The output location could not be opened.
    #[snafu(display("Failed to open output location"))]
    OpenOutput { source: StorageError },

    /// Removing the previous contents of the table failed.
    #[snafu(display("Failed to clear {prefix}"))]
    ClearTable {
        prefix: String,
        source: StorageError,
    },

    /// Uploading an object failed.
    #[snafu(display("Failed to write {path}"))]
    PutObject { path: String, source: StorageError },

    /// Parquet encoding failed.
    #[snafu(display("Parquet encoding failed"))]
    Encode {
        source: parquet::errors::ParquetError,
    },

    /// Splitting rows into partitions failed.
    #[snafu(display("Failed to split rows by {columns:?}"))]
    Partition {
        columns: Vec<String>,
        source: ArrowError,
    },

    /// A partition column is absent from the derived rows.
    #[snafu(display("Partition column {name} not found"))]
    MissingPartitionColumn { name: String },

    /// The blocking encode task panicked or was cancelled.
    #[snafu(display("Encode task failed"))]
    EncodeTask { source: tokio::task::JoinError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level run errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// The input location could not be opened.
    #[snafu(display("Input location unavailable"))]
    Input { source: ReaderError },

    /// Reading a pipeline's source failed.
    #[snafu(display("{pipeline} pipeline failed to read its source"))]
    SourceRead {
        pipeline: PipelineKind,
        source: ReaderError,
    },

    /// Deriving a table failed.
    #[snafu(display("{pipeline} pipeline failed to derive table {table}"))]
    Transform {
        pipeline: PipelineKind,
        table: Table,
        source: TransformError,
    },

    /// Writing a table failed.
    #[snafu(display("{pipeline} pipeline failed to write table {table}"))]
    TableWrite {
        pipeline: PipelineKind,
        table: Table,
        source: WriteError,
    },

    /// The output location could not be opened before any table was written.
    #[snafu(display("Output location unavailable"))]
    Output { source: WriteError },
}

impl PipelineError {
    /// The table being produced when the failure occurred, if any.
    pub fn table(&self) -> Option<Table> {
        match self {
            PipelineError::Transform { table, .. } | PipelineError::TableWrite { table, .. } => {
                Some(*table)
            }
            _ => None,
        }
    }

    /// The pipeline that failed, if the failure happened inside one.
    pub fn pipeline(&self) -> Option<PipelineKind> {
        match self {
            PipelineError::SourceRead { pipeline, .. }
            | PipelineError::Transform { pipeline, .. }
            | PipelineError::TableWrite { pipeline, .. } => Some(*pipeline),
            _ => None,
        }
    }
}
