//! Parquet encoding.
//!
//! Each output file is encoded in memory from one record batch and uploaded
//! with a single PUT.

use arrow::array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::time::Instant;
use uuid::Uuid;

use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{EncodeSnafu, WriteError};
use crate::metrics::events::ParquetEncodeCompleted;

/// Encodes record batches into Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetEncoder {
    compression: ParquetCompression,
    properties: WriterProperties,
}

impl ParquetEncoder {
    pub fn new(compression: ParquetCompression) -> Self {
        Self {
            compression,
            properties: writer_properties(compression),
        }
    }

    /// Encode `batch` as one complete Parquet file.
    pub fn encode(&self, batch: &RecordBatch) -> Result<Bytes, WriteError> {
        let start = Instant::now();
        let mut writer = ArrowWriter::try_new(
            Vec::new(),
            batch.schema(),
            Some(self.properties.clone()),
        )
        .context(EncodeSnafu)?;
        writer.write(batch).context(EncodeSnafu)?;
        let buffer = writer.into_inner().context(EncodeSnafu)?;

        emit!(ParquetEncodeCompleted {
            duration: start.elapsed(),
        });
        Ok(Bytes::from(buffer))
    }

    /// File name for the `index`-th file of a table write.
    pub fn file_name(&self, index: usize) -> String {
        let uuid = Uuid::now_v7();
        match codec_suffix(self.compression) {
            Some(codec) => format!("part-{index:05}-{uuid}.{codec}.parquet"),
            None => format!("part-{index:05}-{uuid}.parquet"),
        }
    }
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}

fn codec_suffix(compression: ParquetCompression) -> Option<&'static str> {
    match compression {
        ParquetCompression::Uncompressed => None,
        ParquetCompression::Snappy => Some("snappy"),
        ParquetCompression::Gzip => Some("gz"),
        ParquetCompression::Zstd => Some("zstd"),
        ParquetCompression::Lz4 => Some("lz4"),
    }
}
