//! Transformer - column-level rewrites for downstream modelling
//!
//! Operations run in the configured order. Unlike the cleaner, every column an
//! operation names must exist in the input.

use crate::error::{ConfigError, ProcessError};
use crate::processors::Processor;
use crate::table::ColumnType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Formats tried, in order, when a datetime operation has no explicit format
const FALLBACK_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatetimeParams {
    /// strftime pattern, e.g. "%d/%m/%Y"
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TransformOp {
    /// z-score using the sample standard deviation
    Normalize { columns: Vec<String> },

    /// Distinct values, sorted by text form, mapped to 0..n
    #[serde(alias = "encode")]
    EncodeCategorical { columns: Vec<String> },

    /// Parse text into millisecond timestamps
    Datetime {
        columns: Vec<String>,
        #[serde(default)]
        params: DatetimeParams,
    },

    /// old name -> new name
    Rename { columns: BTreeMap<String, String> },
}

impl TransformOp {
    pub fn name(&self) -> &'static str {
        match self {
            TransformOp::Normalize { .. } => "normalize",
            TransformOp::EncodeCategorical { .. } => "encode_categorical",
            TransformOp::Datetime { .. } => "datetime",
            TransformOp::Rename { .. } => "rename",
        }
    }
}

pub struct Transformer {
    operations: Vec<TransformOp>,
}

impl Transformer {
    pub fn new(operations: Vec<TransformOp>) -> Self {
        Self { operations }
    }

    /// Build from a JSON list of operations
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let operations: Vec<TransformOp> = serde_json::from_value(value)
            .map_err(|e| ConfigError::Processor(format!("transformer: {}", e)))?;
        Ok(Self::new(operations))
    }

    pub fn operations(&self) -> &[TransformOp] {
        &self.operations
    }

    fn apply(&self, op: &TransformOp, df: &mut DataFrame) -> Result<(), ProcessError> {
        match op {
            TransformOp::Normalize { columns } => {
                for name in columns {
                    ensure_numeric(require(df, op, name)?)?;
                    *df = std::mem::take(df).lazy().with_column(normalize(name)).collect()?;
                }
            }
            TransformOp::EncodeCategorical { columns } => {
                for name in columns {
                    let series = require(df, op, name)?;
                    let encoded = encode(series)?;
                    df.with_column(encoded)?;
                }
            }
            TransformOp::Datetime { columns, params } => {
                for name in columns {
                    let series = require(df, op, name)?;
                    let parsed = parse_datetimes(series, params.format.as_deref())?;
                    df.with_column(parsed)?;
                }
            }
            TransformOp::Rename { columns } => {
                for (old, new) in columns {
                    require(df, op, old)?;
                    if old != new && df.column(new).is_ok() {
                        return Err(ProcessError::InvalidValue {
                            column: old.clone(),
                            message: format!("rename target '{}' already exists", new),
                        });
                    }
                    df.rename(old, new)?;
                }
            }
        }
        Ok(())
    }
}

fn require<'a>(df: &'a DataFrame, op: &TransformOp, name: &str) -> Result<&'a Series, ProcessError> {
    df.column(name).map_err(|_| ProcessError::MissingColumn {
        operation: op.name().to_string(),
        column: name.to_string(),
    })
}

fn ensure_numeric(series: &Series) -> Result<(), ProcessError> {
    if ColumnType::of(series.dtype()).is_numeric() {
        return Ok(());
    }
    Err(ProcessError::InvalidValue {
        column: series.name().to_string(),
        message: format!("cannot normalize non-numeric column of type {}", series.dtype()),
    })
}

/// z-score of `name`; constant or single-valued columns become 0, nulls stay null
fn normalize(name: &str) -> Expr {
    let value = col(name).cast(DataType::Float64);
    let std = value.clone().std(1);
    when(std.clone().gt(lit(0.0)))
        .then((value.clone() - value.clone().mean()) / std)
        .otherwise(value * lit(0.0))
        .alias(name)
}

fn encode(series: &Series) -> Result<Series, ProcessError> {
    let as_text = series.cast(&DataType::String)?;
    let values: Vec<Option<&str>> = as_text.str()?.into_iter().collect();

    let categories: BTreeSet<&str> = values.iter().flatten().copied().collect();
    let codes: BTreeMap<&str, i64> = categories
        .into_iter()
        .enumerate()
        .map(|(code, value)| (value, code as i64))
        .collect();
    debug!("Encoding '{}' with {} categories", series.name(), codes.len());

    let encoded: Vec<Option<i64>> = values.iter().map(|v| v.and_then(|v| codes.get(v).copied())).collect();
    Ok(Series::new(series.name(), encoded))
}

fn parse_one(value: &str, format: Option<&str>) -> Option<i64> {
    let value = value.trim();
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(|dt| dt.and_utc().timestamp_millis());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in FALLBACK_DATE_FORMATS {
        if let Some(dt) = NaiveDate::parse_from_str(value, fmt).ok().and_then(|d| d.and_hms_opt(0, 0, 0)) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    None
}

fn parse_datetimes(series: &Series, format: Option<&str>) -> Result<Series, ProcessError> {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    match ColumnType::of(series.dtype()) {
        ColumnType::Timestamp => return Ok(series.cast(&target)?),
        ColumnType::Text | ColumnType::Category => {}
        _ => {
            return Err(ProcessError::InvalidValue {
                column: series.name().to_string(),
                message: format!("cannot parse datetimes from column of type {}", series.dtype()),
            })
        }
    }

    let as_text = series.cast(&DataType::String)?;
    let mut millis = Vec::with_capacity(series.len());
    for value in as_text.str()?.into_iter() {
        match value {
            None => millis.push(None),
            Some(text) => match parse_one(text, format) {
                Some(ms) => millis.push(Some(ms)),
                None => {
                    return Err(ProcessError::InvalidValue {
                        column: series.name().to_string(),
                        message: format!("unparseable datetime '{}'", text),
                    })
                }
            },
        }
    }

    Ok(Series::new(series.name(), millis).cast(&target)?)
}

impl Processor for Transformer {
    fn process(&self, df: &DataFrame) -> Result<DataFrame, ProcessError> {
        let mut out = df.clone();
        for op in &self.operations {
            self.apply(op, &mut out)?;
        }
        Ok(out)
    }

    fn kind(&self) -> &'static str {
        "transformer"
    }
}
