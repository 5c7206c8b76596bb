//! songlake: a batch job that turns a music-streaming service's raw JSON
//! dumps into a star schema of partitioned Parquet tables.
//!
//! A run reads the song catalog and the listening-session logs from an
//! object store or local directory, derives the `songs`, `artists`,
//! `users`, `time` and `songplays` tables, and overwrites each of them under
//! the output root.
//!
//! # Example
//!
//! ```ignore
//! use snafu::prelude::*;
//! use songlake::{Config, run, error::{ConfigSnafu, PipelineError}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("config.yaml").context(ConfigSnafu)?;
//!     let stats = run(config).await?;
//!     println!("Wrote {} rows", stats.rows_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use pipeline::{RunStats, Survey, run, survey};
pub use schema::Table;
pub use storage::{StorageProvider, StorageProviderRef};
