//! Analyzer - pass-through step that logs descriptive statistics

use crate::error::ProcessError;
use crate::processors::Processor;
use crate::table::ColumnType;
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Maximum number of distinct values reported per text column
const MAX_FREQUENCIES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1)
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    pub missing_values: BTreeMap<String, usize>,
    pub numeric_columns: BTreeMap<String, NumericSummary>,
    /// Most frequent values first
    pub categorical_columns: BTreeMap<String, Vec<(String, usize)>>,
}

/// Name of the count column in the frequency table
const COUNT_COLUMN: &str = "__count";

fn summarize(series: &Series) -> Result<NumericSummary, ProcessError> {
    let values = series.cast(&DataType::Float64)?;
    let values = values.filter(&values.is_not_nan()?)?;
    let present = values.len() - values.null_count();

    Ok(NumericSummary {
        mean: values.mean(),
        std: if present > 1 { values.f64()?.std(1) } else { None },
        min: values.min::<f64>()?,
        max: values.max::<f64>()?,
    })
}

fn frequencies(series: &Series) -> Result<Vec<(String, usize)>, ProcessError> {
    let name = series.name();
    let counts = series
        .clone()
        .into_frame()
        .lazy()
        .select([col(name).cast(DataType::String)])
        .drop_nulls(None)
        .group_by([col(name)])
        .agg([len().alias(COUNT_COLUMN)])
        .sort_by_exprs(
            [col(COUNT_COLUMN), col(name)],
            SortMultipleOptions::default().with_order_descendings([true, false]),
        )
        .limit(MAX_FREQUENCIES as IdxSize)
        .collect()?;

    let values = counts.column(name)?.str()?;
    let totals = counts.column(COUNT_COLUMN)?.cast(&DataType::UInt64)?;
    Ok(values
        .into_iter()
        .zip(totals.u64()?)
        .filter_map(|(value, count)| Some((value?.to_string(), count? as usize)))
        .collect())
}

/// Compute the descriptive statistics the analyzer logs
pub fn profile(df: &DataFrame) -> Result<DatasetProfile, ProcessError> {
    let mut missing_values = BTreeMap::new();
    let mut numeric_columns = BTreeMap::new();
    let mut categorical_columns = BTreeMap::new();

    for series in df.get_columns() {
        let name = series.name().to_string();
        missing_values.insert(name.clone(), series.null_count());

        match ColumnType::of(series.dtype()) {
            ColumnType::Integer | ColumnType::Float => {
                numeric_columns.insert(name, summarize(series)?);
            }
            ColumnType::Text | ColumnType::Category => {
                categorical_columns.insert(name, frequencies(series)?);
            }
            _ => {}
        }
    }

    Ok(DatasetProfile {
        row_count: df.height(),
        column_count: df.width(),
        missing_values,
        numeric_columns,
        categorical_columns,
    })
}

#[derive(Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for Analyzer {
    fn process(&self, df: &DataFrame) -> Result<DataFrame, ProcessError> {
        let stats = profile(df)?;
        let rendered = serde_json::to_string(&stats).unwrap_or_else(|e| e.to_string());
        info!(
            rows = stats.row_count,
            columns = stats.column_count,
            "Data analysis results: {}",
            rendered
        );
        Ok(df.clone())
    }

    fn kind(&self) -> &'static str {
        "analyzer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile() {
        let df = df![
            "value" => [Some(100.0), Some(150.0), Some(200.0), None, Some(175.0)],
            "category" => ["A", "B", "A", "C", "B"],
            "flag" => [true, false, true, true, false],
        ]
        .unwrap();

        let p = profile(&df).unwrap();
        assert_eq!(p.row_count, 5);
        assert_eq!(p.column_count, 3);
        assert_eq!(p.missing_values["value"], 1);

        let value = &p.numeric_columns["value"];
        assert_eq!(value.mean, Some(156.25));
        assert_eq!(value.min, Some(100.0));
        assert_eq!(value.max, Some(200.0));
        assert!((value.std.unwrap() - 42.6956).abs() < 1e-3);

        let category = &p.categorical_columns["category"];
        assert_eq!(category[0], ("A".to_string(), 2));
        assert_eq!(category[1], ("B".to_string(), 2));
        assert_eq!(category[2], ("C".to_string(), 1));
        assert!(!p.numeric_columns.contains_key("flag"));
    }

    #[test]
    fn test_profile_ignores_nan_and_single_values() {
        let df = df![
            "ratio" => [Some(f64::NAN), Some(2.0), None],
            "label" => [Some("x"), None, Some("x")],
        ]
        .unwrap();

        let p = profile(&df).unwrap();
        let ratio = &p.numeric_columns["ratio"];
        assert_eq!(ratio.mean, Some(2.0));
        assert_eq!(ratio.min, Some(2.0));
        assert_eq!(ratio.max, Some(2.0));
        assert_eq!(ratio.std, None);
        assert_eq!(p.categorical_columns["label"], vec![("x".to_string(), 2)]);
    }

    #[test]
    fn test_frequencies_are_capped() {
        let labels: Vec<String> = (0..30).map(|i| format!("v{:02}", i)).collect();
        let df = DataFrame::new(vec![Series::new("label", labels)]).unwrap();
        let p = profile(&df).unwrap();
        let top = &p.categorical_columns["label"];
        assert_eq!(top.len(), MAX_FREQUENCIES);
        assert_eq!(top[0], ("v00".to_string(), 1));
    }

    #[test]
    fn test_analyzer_passes_through() {
        let df = df!["id" => [1i64, 2, 3]].unwrap();
        let out = Analyzer::new().process(&df).unwrap();
        assert!(out.equals(&df));
    }

    #[test]
    fn test_profile_of_empty_frame() {
        let p = profile(&DataFrame::empty()).unwrap();
        assert_eq!(p.row_count, 0);
        assert!(p.numeric_columns.is_empty());
    }
}
