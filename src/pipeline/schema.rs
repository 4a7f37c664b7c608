//! Pipeline Schema - structural description of the latest table

use crate::table::{self, ColumnType};
use polars::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Rows included in `sample_data`
pub const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Distinct non-null values
    pub unique_values: usize,
    pub missing_values: usize,
}

/// Estimated bytes held by the table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub total: usize,
    pub by_column: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSchema {
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub column_count: usize,
    /// column -> polars dtype
    pub data_types: BTreeMap<String, String>,
    pub sample_data: Option<Vec<Map<String, Value>>>,
    pub memory_usage: Option<MemoryUsage>,
}

impl PipelineSchema {
    /// Schema of a table with no rows
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            row_count: 0,
            column_count: 0,
            data_types: BTreeMap::new(),
            sample_data: None,
            memory_usage: None,
        }
    }

    pub fn from_frame(df: &DataFrame) -> PolarsResult<Self> {
        if df.height() == 0 {
            return Ok(Self::empty());
        }

        let mut columns = Vec::with_capacity(df.width());
        let mut data_types = BTreeMap::new();
        let mut by_column = BTreeMap::new();

        for series in df.get_columns() {
            let name = series.name().to_string();
            let missing = series.null_count();
            columns.push(ColumnInfo {
                name: name.clone(),
                column_type: ColumnType::of(series.dtype()),
                nullable: missing > 0,
                unique_values: series.drop_nulls().n_unique()?,
                missing_values: missing,
            });
            data_types.insert(name.clone(), series.dtype().to_string());
            by_column.insert(name, series.estimated_size());
        }

        Ok(Self {
            columns,
            row_count: df.height(),
            column_count: df.width(),
            data_types,
            sample_data: Some(table::to_records(&df.head(Some(SAMPLE_ROWS)))?),
            memory_usage: Some(MemoryUsage {
                total: df.estimated_size(),
                by_column,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_of_sample() {
        let df = df![
            "id" => [1i64, 2, 3, 4, 5, 6],
            "category" => [Some("A"), Some("B"), Some("A"), None, Some("B"), Some("C")],
        ]
        .unwrap();

        let schema = PipelineSchema::from_frame(&df).unwrap();
        assert_eq!(schema.row_count, 6);
        assert_eq!(schema.column_count, 2);

        let category = &schema.columns[1];
        assert_eq!(category.column_type, ColumnType::Text);
        assert!(category.nullable);
        assert_eq!(category.unique_values, 3);
        assert_eq!(category.missing_values, 1);
        assert!(!schema.columns[0].nullable);

        assert_eq!(schema.sample_data.as_ref().unwrap().len(), SAMPLE_ROWS);
        assert!(schema.memory_usage.as_ref().unwrap().total > 0);
        assert_eq!(schema.data_types["id"], "i64");
    }

    #[test]
    fn test_schema_of_empty_table() {
        let schema = PipelineSchema::from_frame(&DataFrame::empty()).unwrap();
        assert_eq!(schema, PipelineSchema::empty());
        assert!(schema.sample_data.is_none());
    }
}
