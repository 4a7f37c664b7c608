//! Table helpers - conversions between JSON records and Polars DataFrames
//!
//! The pipeline's tabular unit is a Polars `DataFrame`. This module holds the
//! pieces every stage shares:
//! - Semantic column types (`ColumnType`)
//! - Deterministic type inference when building a frame from JSON records
//! - Row-oriented serialization back to JSON
//! - Diagonal merging of tables produced by several collectors

use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;

/// Semantic type of a column, derived from its Polars dtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Category,
}

impl ColumnType {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Date | DataType::Datetime(_, _) => ColumnType::Timestamp,
            DataType::Categorical(_, _) | DataType::Enum(_, _) => ColumnType::Category,
            _ => ColumnType::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Category => "category",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value kind observed while scanning JSON records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredKind {
    Unknown,
    Bool,
    Int,
    Float,
    Text,
}

impl InferredKind {
    fn observe(value: &Value) -> Self {
        match value {
            Value::Null => InferredKind::Unknown,
            Value::Bool(_) => InferredKind::Bool,
            Value::Number(n) if n.is_i64() => InferredKind::Int,
            Value::Number(_) => InferredKind::Float,
            _ => InferredKind::Text,
        }
    }

    fn merge(self, other: InferredKind) -> InferredKind {
        match (self, other) {
            (a, b) if a == b => a,
            (InferredKind::Unknown, b) => b,
            (a, InferredKind::Unknown) => a,
            (InferredKind::Int, InferredKind::Float) | (InferredKind::Float, InferredKind::Int) => {
                InferredKind::Float
            }
            _ => InferredKind::Text,
        }
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Build a DataFrame from row-oriented JSON objects.
///
/// Column order is the order in which keys are first seen. Keys missing from a
/// row and JSON nulls become nulls. Nested arrays/objects are kept as JSON text.
pub fn from_records(rows: &[Map<String, Value>]) -> PolarsResult<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    let mut kinds: HashMap<String, InferredKind> = HashMap::new();

    for row in rows {
        for (key, value) in row {
            let observed = InferredKind::observe(value);
            match kinds.get_mut(key) {
                Some(kind) => *kind = kind.merge(observed),
                None => {
                    order.push(key.clone());
                    kinds.insert(key.clone(), observed);
                }
            }
        }
    }

    let mut columns = Vec::with_capacity(order.len());
    for name in &order {
        let cells = rows.iter().map(|row| row.get(name));
        let series = match kinds.get(name).copied().unwrap_or(InferredKind::Unknown) {
            InferredKind::Unknown => Series::full_null(name, rows.len(), &DataType::String),
            InferredKind::Bool => {
                let values: Vec<Option<bool>> = cells.map(|v| v.and_then(Value::as_bool)).collect();
                Series::new(name, values)
            }
            InferredKind::Int => {
                let values: Vec<Option<i64>> = cells.map(|v| v.and_then(Value::as_i64)).collect();
                Series::new(name, values)
            }
            InferredKind::Float => {
                let values: Vec<Option<f64>> = cells.map(|v| v.and_then(Value::as_f64)).collect();
                Series::new(name, values)
            }
            InferredKind::Text => {
                let values: Vec<Option<String>> = cells.map(|v| v.and_then(value_to_text)).collect();
                Series::new(name, values)
            }
        };
        columns.push(series);
    }

    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    DataFrame::new(columns)
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn datetime_to_json(value: i64, unit: TimeUnit) -> Value {
    let parsed = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanoseconds => DateTime::from_timestamp(
            value.div_euclid(1_000_000_000),
            value.rem_euclid(1_000_000_000) as u32,
        ),
    };
    parsed
        .map(|dt| Value::String(dt.to_rfc3339()))
        .unwrap_or(Value::Null)
}

/// Convert a single Polars cell into JSON
pub fn any_value_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(v),
        AnyValue::Int16(v) => Value::from(v),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt8(v) => Value::from(v),
        AnyValue::UInt16(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => float_to_json(v as f64),
        AnyValue::Float64(v) => float_to_json(v),
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + 719_163)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        AnyValue::Datetime(v, unit, _) => datetime_to_json(v, unit),
        other => Value::String(other.to_string().trim_matches('"').to_string()),
    }
}

/// Serialize a DataFrame as a row-oriented list of JSON objects
pub fn to_records(df: &DataFrame) -> PolarsResult<Vec<Map<String, Value>>> {
    // Categorical cells are resolved through their string form
    let columns: Vec<Series> = df
        .get_columns()
        .iter()
        .map(|s| match ColumnType::of(s.dtype()) {
            ColumnType::Category => s.cast(&DataType::String),
            _ => Ok(s.clone()),
        })
        .collect::<PolarsResult<_>>()?;

    let mut records = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let mut row = Map::new();
        for series in &columns {
            row.insert(series.name().to_string(), any_value_to_json(series.get(idx)?));
        }
        records.push(row);
    }
    Ok(records)
}

/// Column names in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

fn widen(current: &DataType, next: &DataType) -> DataType {
    if current == next || *next == DataType::Null {
        return current.clone();
    }
    if *current == DataType::Null {
        return next.clone();
    }
    match (ColumnType::of(current), ColumnType::of(next)) {
        (ColumnType::Integer, ColumnType::Integer) => DataType::Int64,
        (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
        _ => DataType::String,
    }
}

/// Concatenate tables row-wise, aligning columns by name.
///
/// A single table is returned unchanged. With several tables the result holds
/// the union of their columns in first-seen order; rows from a table lacking a
/// column get nulls there. Conflicting dtypes are widened.
pub fn merge_tables(mut tables: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    if tables.len() <= 1 {
        return Ok(tables.pop().unwrap_or_else(DataFrame::empty));
    }

    let mut order: Vec<String> = Vec::new();
    let mut dtypes: HashMap<String, DataType> = HashMap::new();
    for table in &tables {
        for series in table.get_columns() {
            let name = series.name().to_string();
            match dtypes.get_mut(&name) {
                Some(dtype) => *dtype = widen(dtype, series.dtype()),
                None => {
                    order.push(name.clone());
                    dtypes.insert(name, series.dtype().clone());
                }
            }
        }
    }

    let mut merged: Option<DataFrame> = None;
    for table in tables.iter().filter(|t| t.width() > 0) {
        let mut aligned = Vec::with_capacity(order.len());
        for name in &order {
            let target = &dtypes[name];
            let series = match table.column(name) {
                Ok(existing) if existing.dtype() == target => existing.clone(),
                Ok(existing) => existing.cast(target)?,
                Err(_) => Series::full_null(name, table.height(), target),
            };
            aligned.push(series);
        }
        let frame = DataFrame::new(aligned)?;
        merged = Some(match merged {
            Some(mut acc) => {
                acc.vstack_mut(&frame)?;
                acc
            }
            None => frame,
        });
    }

    Ok(merged.unwrap_or_else(DataFrame::empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Map<String, Value>> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_from_records_infers_types_and_order() {
        let df = from_records(&rows(json!([
            {"id": 1, "name": "Product 1", "price": 99.99, "active": true},
            {"id": 2, "name": "Product 2", "price": 150, "active": null},
        ])))
        .unwrap();

        assert_eq!(column_names(&df), vec!["id", "name", "price", "active"]);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("price").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("name").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("active").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(df.column("active").unwrap().null_count(), 1);
    }

    #[test]
    fn test_from_records_missing_keys_become_null() {
        let df = from_records(&rows(json!([
            {"a": 1},
            {"b": "x"},
        ])))
        .unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("a").unwrap().null_count(), 1);
        assert_eq!(df.column("b").unwrap().null_count(), 1);
    }

    #[test]
    fn test_mixed_kinds_fall_back_to_text() {
        let df = from_records(&rows(json!([
            {"v": 1},
            {"v": "two"},
            {"v": {"nested": true}},
        ])))
        .unwrap();

        assert_eq!(df.column("v").unwrap().dtype(), &DataType::String);
        let records = to_records(&df).unwrap();
        assert_eq!(records[0]["v"], json!("1"));
        assert_eq!(records[2]["v"], json!("{\"nested\":true}"));
    }

    #[test]
    fn test_to_records_maps_nan_to_null() {
        let df = df![
            "x" => [Some(1.5), None, Some(f64::NAN)],
        ]
        .unwrap();
        let records = to_records(&df).unwrap();
        assert_eq!(records[0]["x"], json!(1.5));
        assert_eq!(records[1]["x"], Value::Null);
        assert_eq!(records[2]["x"], Value::Null);
    }

    #[test]
    fn test_merge_aligns_columns_by_name() {
        let a = df!["id" => [1i64, 2], "name" => ["a", "b"]].unwrap();
        let b = df!["id" => [3i64], "score" => [0.5]].unwrap();

        let merged = merge_tables(vec![a, b]).unwrap();
        assert_eq!(merged.height(), 3);
        assert_eq!(column_names(&merged), vec!["id", "name", "score"]);
        assert_eq!(merged.column("name").unwrap().null_count(), 1);
        assert_eq!(merged.column("score").unwrap().null_count(), 2);
    }

    #[test]
    fn test_merge_widens_conflicting_types() {
        let a = df!["v" => [1i64, 2]].unwrap();
        let b = df!["v" => [2.5f64]].unwrap();
        let merged = merge_tables(vec![a, b]).unwrap();
        assert_eq!(merged.column("v").unwrap().dtype(), &DataType::Float64);

        let c = df!["v" => [1i64]].unwrap();
        let d = df!["v" => ["x"]].unwrap();
        let merged = merge_tables(vec![c, d]).unwrap();
        assert_eq!(merged.column("v").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_merge_single_and_empty() {
        let a = df!["id" => [1i64]].unwrap();
        let merged = merge_tables(vec![a.clone()]).unwrap();
        assert!(merged.equals(&a));

        let merged = merge_tables(vec![DataFrame::empty(), DataFrame::empty()]).unwrap();
        assert_eq!(merged.height(), 0);
        assert_eq!(merged.width(), 0);
    }

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(ColumnType::of(&DataType::Int32), ColumnType::Integer);
        assert_eq!(ColumnType::of(&DataType::Float32), ColumnType::Float);
        assert_eq!(
            ColumnType::of(&DataType::Datetime(TimeUnit::Milliseconds, None)),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::of(&DataType::String), ColumnType::Text);
        assert_eq!(ColumnType::Boolean.to_string(), "boolean");
    }
}
