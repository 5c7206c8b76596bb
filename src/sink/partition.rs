//! Hive-style partitioning of a table's rows.
//!
//! Rows are grouped by the rendered values of the partition columns. Each
//! group becomes a directory `k1=v1/k2=v2` whose files hold the remaining
//! columns only.

use arrow::array::{Array, AsArray, RecordBatch, UInt32Array};
use arrow::compute::{cast, take_record_batch};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use object_store::path::{Path, PathPart};
use snafu::IntoError;
use snafu::prelude::*;
use std::collections::BTreeMap;

use crate::error::{MissingPartitionColumnSnafu, PartitionSnafu, WriteError};

/// Directory value for null or empty partition values.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Rows sharing one set of partition values.
#[derive(Debug, Clone)]
pub struct Partition {
    /// `(column, rendered value)` pairs, outermost first.
    pub values: Vec<(String, String)>,
    /// Rows without the partition columns.
    pub batch: RecordBatch,
}

impl Partition {
    /// Directory of this partition below `table`.
    pub fn directory(&self, table: &str) -> Path {
        std::iter::once(PathPart::from(table))
            .chain(
                self.values
                    .iter()
                    .map(|(column, value)| PathPart::from(format!("{column}={value}"))),
            )
            .collect()
    }

    /// Split into chunks of at most `max_rows` rows.
    pub fn chunks(&self, max_rows: Option<usize>) -> Vec<RecordBatch> {
        let rows = self.batch.num_rows();
        match max_rows {
            Some(max) if max > 0 && rows > max => (0..rows)
                .step_by(max)
                .map(|offset| self.batch.slice(offset, max.min(rows - offset)))
                .collect(),
            _ => vec![self.batch.clone()],
        }
    }
}

/// Group `batch` by `columns`, ordered by partition values.
///
/// With no partition columns the whole batch is one partition. An empty
/// batch yields no partitions.
pub fn split(batch: &RecordBatch, columns: &[&str]) -> Result<Vec<Partition>, WriteError> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    if columns.is_empty() {
        return Ok(vec![Partition {
            values: Vec::new(),
            batch: batch.clone(),
        }]);
    }

    let schema = batch.schema();
    let mut key_indices = Vec::with_capacity(columns.len());
    for name in columns {
        let index = schema
            .index_of(name)
            .ok()
            .context(MissingPartitionColumnSnafu { name: *name })?;
        key_indices.push(index);
    }

    let fail = |source: ArrowError| {
        PartitionSnafu {
            columns: columns.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        }
        .into_error(source)
    };

    let rendered = key_indices
        .iter()
        .map(|&i| cast(batch.column(i), &DataType::Utf8))
        .collect::<Result<Vec<_>, _>>()
        .map_err(fail)?;

    let mut groups: BTreeMap<Vec<String>, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let key = rendered
            .iter()
            .map(|array| {
                let strings = array.as_string::<i32>();
                if strings.is_null(row) || strings.value(row).is_empty() {
                    DEFAULT_PARTITION.to_string()
                } else {
                    strings.value(row).to_string()
                }
            })
            .collect();
        groups.entry(key).or_default().push(row as u32);
    }

    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !key_indices.contains(i))
        .collect();
    let data = batch.project(&data_indices).map_err(fail)?;

    groups
        .into_iter()
        .map(|(key, rows)| {
            let batch = take_record_batch(&data, &UInt32Array::from(rows)).map_err(fail)?;
            let values = columns
                .iter()
                .map(|c| c.to_string())
                .zip(key)
                .collect();
            Ok(Partition { values, batch })
        })
        .collect()
}
