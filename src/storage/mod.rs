//! Storage - persist and retrieve the latest table per pipeline
//!
//! Saves are last-write-wins: the previous table for a name is replaced.
//! Loading a name that was never saved returns an empty table.

pub mod parquet;
pub mod sqlite;

pub use parquet::ParquetStorage;
pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use crate::table::ColumnType;
use chrono::{DateTime, Utc};
use polars::prelude::{DataFrame, DataType, TimeUnit};
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    /// Replace the stored table for `name`, returning where it was written
    fn save(&self, df: &DataFrame, name: &str) -> Result<String, StorageError>;

    /// Latest stored table, or an empty one if nothing was saved yet
    fn load(&self, name: &str) -> Result<DataFrame, StorageError>;

    /// Where `save` writes for `name`
    fn location(&self, name: &str) -> String;
}

/// Column entry of a schema descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Polars dtype as text, e.g. "i64"
    pub dtype: String,
}

impl StoredColumn {
    /// Parse the recorded dtype text back into a polars dtype
    pub fn data_type(&self) -> Option<DataType> {
        let text = self.dtype.as_str();
        let dtype = match text {
            "i8" => DataType::Int8,
            "i16" => DataType::Int16,
            "i32" => DataType::Int32,
            "i64" => DataType::Int64,
            "u8" => DataType::UInt8,
            "u16" => DataType::UInt16,
            "u32" => DataType::UInt32,
            "u64" => DataType::UInt64,
            "f32" => DataType::Float32,
            "f64" => DataType::Float64,
            "bool" => DataType::Boolean,
            "str" => DataType::String,
            "date" => DataType::Date,
            "cat" => DataType::Categorical(None, Default::default()),
            _ => {
                let inner = text.strip_prefix("datetime[")?.strip_suffix(']')?;
                let (unit, tz) = match inner.split_once(',') {
                    Some((unit, tz)) => (unit.trim(), Some(tz.trim().to_string())),
                    None => (inner.trim(), None),
                };
                DataType::Datetime(time_unit(unit)?, tz)
            }
        };
        Some(dtype)
    }
}

fn time_unit(text: &str) -> Option<TimeUnit> {
    match text {
        "ns" => Some(TimeUnit::Nanoseconds),
        "μs" | "us" => Some(TimeUnit::Microseconds),
        "ms" => Some(TimeUnit::Milliseconds),
        _ => None,
    }
}

/// Schema descriptor written next to every stored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub columns: Vec<StoredColumn>,
    /// (rows, columns)
    pub shape: (usize, usize),
    pub saved_at: DateTime<Utc>,
}

impl SchemaDescriptor {
    pub fn describe(name: &str, df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|s| StoredColumn {
                name: s.name().to_string(),
                column_type: ColumnType::of(s.dtype()),
                dtype: s.dtype().to_string(),
            })
            .collect();

        Self {
            name: name.to_string(),
            columns,
            shape: df.shape(),
            saved_at: Utc::now(),
        }
    }
}

/// Reject names that could escape the storage root
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName("name is empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
