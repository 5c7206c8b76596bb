//! Test fixtures: dataframes decoded from inline NDJSON.

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::datatypes::{Int32Type, Int64Type, SchemaRef};
use bytes::Bytes;
use datafusion::dataframe::DataFrame;
use datafusion::prelude::SessionContext;

use crate::config::CompressionFormat;
use crate::schema::{LogField, SongField, Table, TableColumns};
use crate::source::{NdjsonReader, NdjsonReaderConfig};

fn decode(schema: SchemaRef, lines: &[&str]) -> DataFrame {
    let reader = NdjsonReader::new(
        schema.clone(),
        NdjsonReaderConfig::new(8192, CompressionFormat::None),
    );
    let result = reader
        .read(Bytes::from(lines.join("\n")), "fixture.json")
        .unwrap();
    super::dataframe(&SessionContext::new(), schema, result.batches).unwrap()
}

pub fn songs(lines: &[&str]) -> DataFrame {
    decode(SongField::schema(), lines)
}

pub fn logs(lines: &[&str]) -> DataFrame {
    decode(LogField::schema(), lines)
}

/// A catalog record with the fields the pipelines use.
pub fn song(song_id: &str, title: &str, artist_id: &str, artist_name: &str, year: i32) -> String {
    format!(
        r#"{{"num_songs":1,"artist_id":"{artist_id}","artist_latitude":null,"artist_longitude":null,"artist_location":"","artist_name":"{artist_name}","song_id":"{song_id}","title":"{title}","duration":200.5,"year":{year}}}"#
    )
}

/// A log event with the fields the pipelines use.
pub fn event(page: &str, user_id: &str, level: &str, artist: &str, ts: i64) -> String {
    format!(
        r#"{{"artist":"{artist}","auth":"Logged In","firstName":"Kaylee","gender":"F","itemInSession":0,"lastName":"Summers","length":200.5,"level":"{level}","location":"Phoenix-Mesa-Scottsdale, AZ","method":"PUT","page":"{page}","registration":1540344794796.0,"sessionId":139,"song":"Yellow","status":200,"ts":{ts},"userAgent":"Mozilla/5.0","userId":"{user_id}"}}"#
    )
}

/// Rows of a table plan, conformed to the table schema.
pub async fn derive(table: Table, plan: DataFrame) -> Vec<RecordBatch> {
    super::materialize(table, plan).await.unwrap()
}

pub fn num_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(RecordBatch::num_rows).sum()
}

fn column(batches: &[RecordBatch], name: &str) -> Option<ArrayRef> {
    let first = batches.first()?;
    let batch = arrow::compute::concat_batches(&first.schema(), batches).unwrap();
    Some(batch.column_by_name(name).unwrap().clone())
}

pub fn strings(batches: &[RecordBatch], name: &str) -> Vec<Option<String>> {
    let Some(array) = column(batches, name) else {
        return Vec::new();
    };
    let array = array.as_string::<i32>();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
        .collect()
}

pub fn ints(batches: &[RecordBatch], name: &str) -> Vec<Option<i32>> {
    let Some(array) = column(batches, name) else {
        return Vec::new();
    };
    let array = array.as_primitive::<Int32Type>();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i)))
        .collect()
}

pub fn longs(batches: &[RecordBatch], name: &str) -> Vec<Option<i64>> {
    let Some(array) = column(batches, name) else {
        return Vec::new();
    };
    let array = array.as_primitive::<Int64Type>();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i)))
        .collect()
}
