//! NDJSON reader.
//!
//! Decodes newline-delimited JSON files (optionally gzip-compressed) into
//! Arrow RecordBatches of a fixed schema. Fields absent from the schema are
//! ignored, missing fields become null, and JSON numbers landing in text
//! columns are kept as their decimal text.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use arrow::json::ReaderBuilder;
use bytes::Bytes;
use snafu::prelude::*;
use std::borrow::Cow;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::CompressionFormat;
use crate::emit;
use crate::error::{DecoderBuildSnafu, GzipDecompressionSnafu, JsonDecodeSnafu, ReaderError};
use crate::metrics::events::{BytesRead, FileDecodeCompleted};

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonReaderConfig {
    /// Number of records per batch.
    pub batch_size: usize,
    /// Compression format of input files.
    pub compression: CompressionFormat,
}

impl NdjsonReaderConfig {
    pub fn new(batch_size: usize, compression: CompressionFormat) -> Self {
        Self {
            batch_size,
            compression,
        }
    }
}

/// Result of reading and parsing a file.
#[derive(Debug)]
pub struct ReadResult {
    pub batches: Vec<RecordBatch>,
    pub total_records: usize,
}

/// Decodes whole files into record batches.
pub struct NdjsonReader {
    schema: SchemaRef,
    config: NdjsonReaderConfig,
}

impl NdjsonReader {
    pub fn new(schema: SchemaRef, config: NdjsonReaderConfig) -> Self {
        Self { schema, config }
    }

    /// Decompress `raw` according to the configured format and decode it.
    ///
    /// `path` is only used for error messages and logging.
    pub fn read(&self, raw: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        emit!(BytesRead {
            bytes: raw.len() as u64,
        });
        let start = Instant::now();

        let data: Cow<'_, [u8]> = match self.config.compression {
            CompressionFormat::Gzip => {
                let mut decoder = flate2::read::MultiGzDecoder::new(&raw[..]);
                let mut buf = Vec::new();
                decoder
                    .read_to_end(&mut buf)
                    .context(GzipDecompressionSnafu { path })?;
                debug!("Decompressed {} -> {} bytes for {}", raw.len(), buf.len(), path);
                Cow::Owned(buf)
            }
            CompressionFormat::None => Cow::Borrowed(&raw[..]),
        };

        let mut decoder = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.config.batch_size)
            .with_strict_mode(false)
            .with_coerce_primitive(true)
            .build_decoder()
            .map_err(|e| {
                DecoderBuildSnafu {
                    message: e.to_string(),
                }
                .build()
            })?;

        let decode_error = |e: arrow::error::ArrowError| {
            JsonDecodeSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        };

        // decode() stops once batch_size rows are buffered, so flush after
        // every call until the input is exhausted.
        let mut offset = 0;
        let mut batches = Vec::new();
        let mut total_records = 0;
        loop {
            let consumed = decoder.decode(&data[offset..]).map_err(decode_error)?;
            if let Some(batch) = decoder.flush().map_err(decode_error)? {
                total_records += batch.num_rows();
                batches.push(batch);
            }
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }

        emit!(FileDecodeCompleted {
            duration: start.elapsed(),
        });
        debug!(
            "Parsed {} batches ({} records) from {}",
            batches.len(),
            total_records,
            path
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogField, SongField, TableColumns};
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Float64Type, Int32Type};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const SONG: &str = r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud", "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff", "duration": 152.92036, "year": 0}"#;

    fn reader(batch_size: usize, compression: CompressionFormat) -> NdjsonReader {
        NdjsonReader::new(
            SongField::schema(),
            NdjsonReaderConfig::new(batch_size, compression),
        )
    }

    #[test]
    fn test_single_object_without_trailing_newline() {
        let result = reader(8192, CompressionFormat::None)
            .read(Bytes::from(SONG), "song.json")
            .unwrap();

        assert_eq!(result.total_records, 1);
        let batch = &result.batches[0];
        let duration = batch
            .column_by_name("duration")
            .unwrap()
            .as_primitive::<Float64Type>();
        assert_eq!(duration.value(0), 152.92036);
        let year = batch.column_by_name("year").unwrap().as_primitive::<Int32Type>();
        assert_eq!(year.value(0), 0);
        assert!(batch.column_by_name("artist_latitude").unwrap().is_null(0));
    }

    #[test]
    fn test_batches_split_at_batch_size() {
        let body = format!("{SONG}\n").repeat(5);
        let result = reader(2, CompressionFormat::None)
            .read(Bytes::from(body), "songs.json")
            .unwrap();

        assert_eq!(result.total_records, 5);
        let sizes: Vec<_> = result.batches.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_gzip_input() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(format!("{SONG}\n{SONG}\n").as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let result = reader(8192, CompressionFormat::Gzip)
            .read(Bytes::from(compressed), "songs.json.gz")
            .unwrap();
        assert_eq!(result.total_records, 2);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let err = reader(8192, CompressionFormat::Gzip)
            .read(Bytes::from_static(b"not gzip"), "bad.json.gz")
            .unwrap_err();
        assert!(matches!(err, ReaderError::GzipDecompression { .. }));
    }

    #[test]
    fn test_numeric_ts_is_kept_as_text() {
        let log = r#"{"artist":"Coldplay","page":"NextSong","ts":1541990258796,"userId":"39","sessionId":38,"length":263.99,"extra":"ignored"}"#;
        let reader = NdjsonReader::new(
            LogField::schema(),
            NdjsonReaderConfig::new(8192, CompressionFormat::None),
        );
        let result = reader.read(Bytes::from(log), "log.json").unwrap();
        let batch = &result.batches[0];
        let ts = batch.column_by_name("ts").unwrap().as_string::<i32>();
        assert_eq!(ts.value(0), "1541990258796");
        assert!(batch.column_by_name("firstName").unwrap().is_null(0));
    }

    #[test]
    fn test_type_mismatch_is_a_decode_error() {
        let err = reader(8192, CompressionFormat::None)
            .read(Bytes::from(r#"{"year": "not a year"}"#), "bad.json")
            .unwrap_err();
        assert!(matches!(err, ReaderError::JsonDecode { .. }));
    }

    #[test]
    fn test_empty_file_yields_no_rows() {
        let result = reader(8192, CompressionFormat::None)
            .read(Bytes::new(), "empty.json")
            .unwrap();
        assert_eq!(result.total_records, 0);
        assert!(result.batches.is_empty());
    }
}
