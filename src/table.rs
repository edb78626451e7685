//! Ragged row sets to Arrow record batches and Parquet bytes.
//!
//! Columns are the sorted union of keys across all rows. A row missing a key
//! gets a null in that column. Column types are inferred from the non-null
//! values: integers widen to floats, and any other mix falls back to strings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;

use crate::error::HarvestError;
use crate::flatten::FeatureRecord;

/// Inferred column type. `Null` means no value seen yet and is written as a
/// nullable string column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Null,
    Boolean,
    Int,
    Float,
    Utf8,
}

impl ColumnKind {
    fn merge(self, value: &Value) -> Self {
        let observed = match value {
            Value::Null => return self,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Number(number) if number.is_i64() => ColumnKind::Int,
            Value::Number(_) => ColumnKind::Float,
            _ => ColumnKind::Utf8,
        };
        match (self, observed) {
            (ColumnKind::Null, kind) => kind,
            (current, kind) if current == kind => current,
            (ColumnKind::Int, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Utf8,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Null | ColumnKind::Utf8 => DataType::Utf8,
        }
    }
}

/// Sorted union of the keys present in any row.
pub fn column_names(rows: &[FeatureRecord]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn infer_kinds(rows: &[FeatureRecord], seeds: &[(&str, ColumnKind)]) -> BTreeMap<String, ColumnKind> {
    let mut kinds = column_names(rows)
        .into_iter()
        .map(|name| (name, ColumnKind::Null))
        .collect::<BTreeMap<_, _>>();
    for (name, kind) in seeds {
        kinds.insert(name.to_string(), *kind);
    }
    for row in rows {
        for (key, value) in row {
            if let Some(kind) = kinds.get_mut(key) {
                *kind = kind.merge(value);
            }
        }
    }
    kinds
}

fn build_column(rows: &[FeatureRecord], name: &str, kind: ColumnKind) -> ArrayRef {
    let cells = rows.iter().map(|row| row.get(name).filter(|v| !v.is_null()));
    match kind {
        ColumnKind::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(rows.len());
            cells.for_each(|cell| builder.append_option(cell.and_then(Value::as_bool)));
            Arc::new(builder.finish())
        }
        ColumnKind::Int => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            cells.for_each(|cell| builder.append_option(cell.and_then(Value::as_i64)));
            Arc::new(builder.finish())
        }
        ColumnKind::Float => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            cells.for_each(|cell| builder.append_option(cell.and_then(Value::as_f64)));
            Arc::new(builder.finish())
        }
        ColumnKind::Null | ColumnKind::Utf8 => {
            let mut builder = StringBuilder::new();
            cells.for_each(|cell| match cell {
                Some(Value::String(text)) => builder.append_value(text),
                Some(other) => builder.append_value(other.to_string()),
                None => builder.append_null(),
            });
            Arc::new(builder.finish())
        }
    }
}

pub fn to_record_batch(rows: &[FeatureRecord]) -> Result<RecordBatch, HarvestError> {
    to_seeded_record_batch(rows, &[])
}

/// Like [`to_record_batch`], but every seed column is present even when no
/// row carries it. Observed values still widen a seed's kind.
pub fn to_seeded_record_batch(
    rows: &[FeatureRecord],
    seeds: &[(&str, ColumnKind)],
) -> Result<RecordBatch, HarvestError> {
    let kinds = infer_kinds(rows, seeds);
    let fields = kinds
        .iter()
        .map(|(name, kind)| Field::new(name, kind.data_type(), true))
        .collect::<Vec<_>>();
    let columns = kinds
        .iter()
        .map(|(name, kind)| build_column(rows, name, *kind))
        .collect::<Vec<_>>();
    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    RecordBatch::try_new_with_options(schema, columns, &options)
        .map_err(|err| HarvestError::Table(err.to_string()))
}

/// Parquet has no representation for a schema without fields, so such a
/// batch is rejected.
pub fn serialize_parquet(batch: &RecordBatch) -> Result<Vec<u8>, HarvestError> {
    if batch.num_columns() == 0 {
        return Err(HarvestError::Table(
            "cannot write a table without columns".to_string(),
        ));
    }
    let span = tracing::debug_span!(
        "parquet.serialize",
        rows = batch.num_rows(),
        columns = batch.num_columns()
    );
    let _guard = span.enter();

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
            .map_err(|err| HarvestError::Table(err.to_string()))?;
        if batch.num_rows() > 0 {
            writer
                .write(batch)
                .map_err(|err| HarvestError::Table(err.to_string()))?;
        }
        writer
            .close()
            .map_err(|err| HarvestError::Table(err.to_string()))?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> FeatureRecord {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn disjoint_rows_share_one_table() {
        let rows = vec![
            row(json!({"ADM1_EN": "Bangkok", "mean": 0.42})),
            row(json!({"sum": 7, "variable": "FireCount"})),
        ];
        let batch = to_record_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(column_names(&rows), vec!["ADM1_EN", "mean", "sum", "variable"]);

        let sum = batch
            .column_by_name("sum")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert!(sum.is_null(0));
        assert_eq!(sum.value(1), 7);

        let name = batch
            .column_by_name("ADM1_EN")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(name.value(0), "Bangkok");
        assert!(name.is_null(1));
    }

    #[test]
    fn mixed_numbers_widen_to_float() {
        let rows = vec![row(json!({"mean": 1})), row(json!({"mean": 2.5}))];
        let batch = to_record_batch(&rows).unwrap();
        let mean = batch
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(mean.value(0), 1.0);
        assert_eq!(mean.value(1), 2.5);
    }

    #[test]
    fn conflicting_kinds_fall_back_to_strings() {
        let rows = vec![row(json!({"code": 10})), row(json!({"code": "TH-10"}))];
        let batch = to_record_batch(&rows).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        let code = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(code.value(0), "10");
    }

    #[test]
    fn empty_rows_make_an_empty_table() {
        let batch = to_record_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }

    #[test]
    fn seeds_keep_columns_for_empty_rows() {
        let seeds = [("month", ColumnKind::Int), ("variable", ColumnKind::Utf8)];
        let batch = to_seeded_record_batch(&[], &seeds).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().field(0).name(), "month");
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Int64);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn seeded_int_widens_on_float_values() {
        let rows = vec![row(json!({"year": 2020.5}))];
        let batch = to_seeded_record_batch(&rows, &[("year", ColumnKind::Int)]).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn columnless_batch_is_not_written() {
        let batch = to_record_batch(&[]).unwrap();
        assert!(matches!(serialize_parquet(&batch), Err(HarvestError::Table(_))));
    }

    #[test]
    fn parquet_bytes_have_magic() {
        let rows = vec![row(json!({"year": 2020}))];
        let bytes = serialize_parquet(&to_record_batch(&rows).unwrap()).unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");
    }
}
