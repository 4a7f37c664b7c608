//! Cleaner - drop, rename, fill and de-duplicate
//!
//! Steps always run in this order: drop columns, rename columns, fill nulls,
//! drop duplicate rows. Column names that are not present in the input are
//! logged and skipped.

use crate::error::{ConfigError, ProcessError};
use crate::processors::Processor;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanerConfig {
    /// Columns to remove
    #[serde(default)]
    pub drop_columns: Vec<String>,

    /// old name -> new name
    #[serde(default)]
    pub rename_columns: BTreeMap<String, String>,

    /// column -> scalar used to replace nulls
    #[serde(default, alias = "fill_na")]
    pub fill_values: BTreeMap<String, Value>,

    /// Subset used to detect duplicate rows; empty means all columns
    #[serde(default)]
    pub drop_duplicates: Option<Vec<String>>,
}

pub struct Cleaner {
    config: CleanerConfig,
}

impl Cleaner {
    pub fn new(config: CleanerConfig) -> Result<Self, ConfigError> {
        for (column, value) in &config.fill_values {
            if fill_literal(value).is_none() {
                return Err(ConfigError::Processor(format!(
                    "fill value for '{}' must be a string, number or boolean, got {}",
                    column, value
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: CleanerConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::Processor(format!("cleaner: {}", e)))?;
        Self::new(config)
    }

    fn drop_columns(&self, mut df: DataFrame) -> DataFrame {
        for name in &self.config.drop_columns {
            match df.drop_in_place(name) {
                Ok(_) => debug!("Dropped column '{}'", name),
                Err(_) => warn!("Cannot drop '{}': column not found", name),
            }
        }
        df
    }

    fn rename_columns(&self, mut df: DataFrame) -> Result<DataFrame, ProcessError> {
        for (old, new) in &self.config.rename_columns {
            if df.column(old).is_err() {
                warn!("Cannot rename '{}': column not found", old);
                continue;
            }
            if old != new && df.column(new).is_ok() {
                return Err(ProcessError::InvalidValue {
                    column: old.clone(),
                    message: format!("rename target '{}' already exists", new),
                });
            }
            df.rename(old, new)?;
        }
        Ok(df)
    }

    fn fill_nulls(&self, df: DataFrame) -> Result<DataFrame, ProcessError> {
        let mut exprs = Vec::new();
        for (name, value) in &self.config.fill_values {
            if df.column(name).is_err() {
                warn!("Cannot fill '{}': column not found", name);
                continue;
            }
            if let Some(literal) = fill_literal(value) {
                exprs.push(col(name).fill_null(literal));
            }
        }
        if exprs.is_empty() {
            return Ok(df);
        }
        Ok(df.lazy().with_columns(exprs).collect()?)
    }

    fn drop_duplicates(&self, df: DataFrame) -> Result<DataFrame, ProcessError> {
        let Some(subset) = &self.config.drop_duplicates else {
            return Ok(df);
        };

        let keys = if subset.is_empty() {
            None
        } else {
            let present: Vec<String> = subset
                .iter()
                .filter(|name| {
                    let found = df.column(name).is_ok();
                    if !found {
                        warn!("Ignoring duplicate key '{}': column not found", name);
                    }
                    found
                })
                .cloned()
                .collect();
            if present.is_empty() {
                return Ok(df);
            }
            Some(present)
        };

        let before = df.height();
        let out = df.lazy().unique_stable(keys, UniqueKeepStrategy::First).collect()?;
        if out.height() < before {
            debug!("Removed {} duplicate rows", before - out.height());
        }
        Ok(out)
    }
}

fn fill_literal(value: &Value) -> Option<Expr> {
    match value {
        Value::Bool(b) => Some(lit(*b)),
        Value::Number(n) => n.as_i64().map(lit).or_else(|| n.as_f64().map(lit)),
        Value::String(s) => Some(lit(s.clone())),
        _ => None,
    }
}

impl Processor for Cleaner {
    fn process(&self, df: &DataFrame) -> Result<DataFrame, ProcessError> {
        let df = self.drop_columns(df.clone());
        let df = self.rename_columns(df)?;
        let df = self.fill_nulls(df)?;
        self.drop_duplicates(df)
    }

    fn kind(&self) -> &'static str {
        "cleaner"
    }
}
