//! Source side of a run: discover JSON files under the input root and
//! decode them into record batches of a fixed schema.

pub mod glob;
pub mod reader;

pub use glob::Glob;
pub use reader::{NdjsonReader, NdjsonReaderConfig, ReadResult};

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use futures::future::ready;
use futures::{StreamExt, TryStreamExt, stream};
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::emit;
use crate::error::{
    DecodeTaskSnafu, FetchFileSnafu, ListFilesSnafu, NoInputFilesSnafu, ReaderError,
};
use crate::metrics::events::{ActiveDownloads, FileDownloadCompleted, SourceFileRead};
use crate::schema::PipelineKind;
use crate::storage::StorageProviderRef;

/// Reads every file matching a pattern into one set of batches.
#[derive(Debug, Clone)]
pub struct SourceReader {
    storage: StorageProviderRef,
    config: NdjsonReaderConfig,
    max_concurrent_files: usize,
}

impl SourceReader {
    pub fn new(
        storage: StorageProviderRef,
        config: NdjsonReaderConfig,
        max_concurrent_files: usize,
    ) -> Self {
        Self {
            storage,
            config,
            max_concurrent_files,
        }
    }

    /// Matching files under the input root, sorted by path.
    pub async fn list(&self, glob: &Glob) -> Result<Vec<Path>, ReaderError> {
        let mut files: Vec<Path> = self
            .storage
            .list_with_prefix(glob.prefix())
            .try_filter(|path| {
                let path: &str = path.as_ref();
                ready(glob.matches(path))
            })
            .try_collect()
            .await
            .context(ListFilesSnafu {
                pattern: glob.as_str(),
            })?;
        files.sort_by_key(|path| path.to_string());
        Ok(files)
    }

    /// Read all matching files into batches of `schema`.
    ///
    /// Downloads run concurrently but rows keep file order, so the same
    /// snapshot always yields the same batches.
    pub async fn read(
        &self,
        pipeline: PipelineKind,
        glob: &Glob,
        schema: SchemaRef,
    ) -> Result<Vec<RecordBatch>, ReaderError> {
        let files = self.list(glob).await?;
        ensure!(
            !files.is_empty(),
            NoInputFilesSnafu {
                pattern: glob.as_str(),
            }
        );
        info!(
            "Reading {} {} files matching {} from {}",
            files.len(),
            pipeline,
            glob.as_str(),
            self.storage.canonical_url()
        );

        let reader = Arc::new(NdjsonReader::new(schema, self.config.clone()));
        let active = Arc::new(AtomicUsize::new(0));

        let per_file: Vec<ReadResult> = stream::iter(files)
            .map(|path| {
                let storage = self.storage.clone();
                let reader = reader.clone();
                let active = active.clone();
                async move {
                    let count = active.fetch_add(1, Ordering::Relaxed) + 1;
                    emit!(ActiveDownloads { count });
                    let start = Instant::now();
                    let fetched = storage.get(&path).await;
                    let count = active.fetch_sub(1, Ordering::Relaxed) - 1;
                    emit!(ActiveDownloads { count });

                    let path = path.to_string();
                    let bytes = fetched.context(FetchFileSnafu { path: &path })?;
                    emit!(FileDownloadCompleted {
                        duration: start.elapsed(),
                    });

                    let result = tokio::task::spawn_blocking(move || reader.read(bytes, &path))
                        .await
                        .context(DecodeTaskSnafu)??;
                    emit!(SourceFileRead {
                        pipeline,
                        records: result.total_records as u64,
                    });
                    Ok::<_, ReaderError>(result)
                }
            })
            .buffered(self.max_concurrent_files)
            .try_collect()
            .await?;

        let records: usize = per_file.iter().map(|r| r.total_records).sum();
        debug!("Decoded {} {} records", records, pipeline);

        Ok(per_file.into_iter().flat_map(|r| r.batches).collect())
    }
}
