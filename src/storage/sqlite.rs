//! SQLite Storage - one table per pipeline in a single database file
//!
//! Column dtypes are recorded in `_pipeline_schemas` so that `load` can
//! restore narrow numbers, timestamps, booleans and categories that SQLite
//! cannot represent natively. Temporal columns are stored as their physical
//! integer in the column's own unit.

use crate::error::StorageError;
use crate::storage::{validate_name, SchemaDescriptor, Storage, StoredColumn};
use crate::table::ColumnType;
use polars::prelude::*;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub struct SqliteStorage {
    /// Database path (":memory:" for in-memory databases)
    path: PathBuf,
    db: Mutex<Connection>,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_name(name: &str) -> String {
    quote_ident(&format!("pipeline_{}", name))
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Boolean | ColumnType::Timestamp => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text | ColumnType::Category => "TEXT",
    }
}

/// Dtype used when a descriptor records a dtype this module cannot parse
fn fallback_dtype(column_type: ColumnType) -> Option<DataType> {
    match column_type {
        ColumnType::Timestamp => Some(DataType::Datetime(TimeUnit::Milliseconds, None)),
        ColumnType::Category => Some(DataType::Categorical(None, Default::default())),
        _ => None,
    }
}

/// Column in the shape it is written to SQLite
fn storable(series: &Series) -> PolarsResult<Series> {
    match ColumnType::of(series.dtype()) {
        ColumnType::Timestamp => series.to_physical_repr().cast(&DataType::Int64),
        ColumnType::Integer | ColumnType::Boolean => series.cast(&DataType::Int64),
        ColumnType::Float => series.cast(&DataType::Float64),
        ColumnType::Text | ColumnType::Category => series.cast(&DataType::String),
    }
}

fn sql_value(series: &Series, idx: usize) -> PolarsResult<SqlValue> {
    Ok(match series.get(idx)? {
        AnyValue::Null => SqlValue::Null,
        AnyValue::Int64(v) => SqlValue::Integer(v),
        AnyValue::Float64(v) => SqlValue::Real(v),
        AnyValue::String(s) => SqlValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => SqlValue::Text(s.to_string()),
        other => SqlValue::Text(other.to_string()),
    })
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(&path)?;
        Self::with_connection(path, db)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(PathBuf::from(":memory:"), Connection::open_in_memory()?)
    }

    fn with_connection(path: PathBuf, db: Connection) -> Result<Self, StorageError> {
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS _pipeline_schemas (
                pipeline TEXT PRIMARY KEY,
                descriptor TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            path,
            db: Mutex::new(db),
        })
    }

    fn descriptor(db: &Connection, name: &str) -> Result<Option<SchemaDescriptor>, StorageError> {
        let raw: Option<String> = db
            .query_row(
                "SELECT descriptor FROM _pipeline_schemas WHERE pipeline = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn load_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>, StorageError> {
        validate_name(name)?;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        Self::descriptor(&db, name)
    }

    fn restore(column: &StoredColumn, db_rows: &[Vec<SqlValue>], idx: usize) -> PolarsResult<Series> {
        let name = column.name.as_str();
        let cells = db_rows.iter().map(|row| &row[idx]);
        let series = match column.column_type {
            ColumnType::Boolean => Series::new(
                name,
                cells
                    .map(|v| match v {
                        SqlValue::Integer(i) => Some(*i != 0),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            ColumnType::Integer | ColumnType::Timestamp => Series::new(
                name,
                cells
                    .map(|v| match v {
                        SqlValue::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            ColumnType::Float => Series::new(
                name,
                cells
                    .map(|v| match v {
                        SqlValue::Real(f) => Some(*f),
                        SqlValue::Integer(i) => Some(*i as f64),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            ColumnType::Text | ColumnType::Category => Series::new(
                name,
                cells
                    .map(|v| match v {
                        SqlValue::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
        };

        match column.data_type().or_else(|| fallback_dtype(column.column_type)) {
            // days are stored widened to i64
            Some(DataType::Date) => series.cast(&DataType::Int32)?.cast(&DataType::Date),
            Some(dtype) if &dtype != series.dtype() => series.cast(&dtype),
            _ => Ok(series),
        }
    }
}

impl Storage for SqliteStorage {
    fn save(&self, df: &DataFrame, name: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        if df.width() == 0 {
            return Err(StorageError::EmptyTable(name.to_string()));
        }

        let descriptor = SchemaDescriptor::describe(name, df);
        let columns = df.get_columns().iter().map(storable).collect::<PolarsResult<Vec<_>>>()?;

        let mut db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let tx = db.transaction()?;

        let table = table_name(name);
        tx.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        let definitions = descriptor
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(c.column_type)))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(&format!("CREATE TABLE {} ({})", table, definitions), [])?;

        {
            let placeholders = vec!["?"; columns.len()].join(", ");
            let mut stmt = tx.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
            for idx in 0..df.height() {
                let values = columns
                    .iter()
                    .map(|s| sql_value(s, idx))
                    .collect::<PolarsResult<Vec<_>>>()?;
                stmt.execute(params_from_iter(values))?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO _pipeline_schemas (pipeline, descriptor, saved_at) VALUES (?1, ?2, ?3)",
            params![name, serde_json::to_string(&descriptor)?, descriptor.saved_at.to_rfc3339()],
        )?;
        tx.commit()?;

        info!("Saved {} rows for '{}' to {}", df.height(), name, self.path.display());
        Ok(self.location(name))
    }

    fn load(&self, name: &str) -> Result<DataFrame, StorageError> {
        validate_name(name)?;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());

        let Some(descriptor) = Self::descriptor(&db, name)? else {
            debug!("No stored data for '{}'", name);
            return Ok(DataFrame::empty());
        };

        let width = descriptor.columns.len();
        let mut stmt = db.prepare(&format!("SELECT * FROM {}", table_name(name)))?;
        let db_rows = stmt
            .query_map([], |row| {
                (0..width).map(|i| row.get::<_, SqlValue>(i)).collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let columns = descriptor
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| Self::restore(column, &db_rows, idx))
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(DataFrame::new(columns)?)
    }

    fn location(&self, name: &str) -> String {
        format!("{}:{}", self.path.display(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn typed_sample() -> DataFrame {
        let mut df = df![
            "small" => [1i32, -2, 3],
            "ratio" => [0.5f32, 1.25, -4.0],
            "day" => [
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                NaiveDate::from_ymd_opt(1969, 12, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            ],
        ]
        .unwrap();
        df.with_column(
            Series::new("at", [1_705_276_800_000_123i64, 1_705_276_800_000_456, 1_705_276_800_999_999])
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .unwrap(),
        )
        .unwrap();
        df.with_column(
            Series::new("grade", [Some("b"), None, Some("a")])
                .cast(&DataType::Categorical(None, Default::default()))
                .unwrap(),
        )
        .unwrap();
        df
    }

    fn assert_same_table(loaded: &DataFrame, expected: &DataFrame) {
        assert_eq!(loaded.get_column_names(), expected.get_column_names());
        assert_eq!(loaded.dtypes(), expected.dtypes());
        for (got, want) in loaded.get_columns().iter().zip(expected.get_columns()) {
            // category codes depend on the rev-map, so compare the text form
            let got = got.cast(&DataType::String).unwrap();
            let want = want.cast(&DataType::String).unwrap();
            assert!(got.equals_missing(&want), "column '{}' differs", want.name());
        }
    }

    #[test]
    fn test_round_trip_restores_types() {
        let storage = SqliteStorage::in_memory().unwrap();
        let df = df![
            "id" => [1i64, 2, 3],
            "name" => [Some("a"), None, Some("c")],
            "score" => [0.5, 1.5, 2.5],
            "active" => [true, false, true],
        ]
        .unwrap();

        let location = storage.save(&df, "p1").unwrap();
        assert_eq!(location, ":memory::p1");

        let loaded = storage.load("p1").unwrap();
        assert!(loaded.equals_missing(&df));
        assert_eq!(loaded.dtypes(), df.dtypes());
    }

    #[test]
    fn test_round_trip_keeps_narrow_and_temporal_dtypes() {
        let storage = SqliteStorage::in_memory().unwrap();
        let df = typed_sample();
        storage.save(&df, "typed").unwrap();

        let loaded = storage.load("typed").unwrap();
        assert_same_table(&loaded, &df);

        // sub-millisecond precision survives
        let micros: Vec<Option<i64>> = loaded
            .column("at")
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(micros[0], Some(1_705_276_800_000_123));
    }

    #[test]
    fn test_replace_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("pipelines.db")).unwrap();

        assert_eq!(storage.load("p1").unwrap().shape(), (0, 0));

        storage.save(&df!["a" => [1i64, 2]].unwrap(), "p1").unwrap();
        storage.save(&df!["b" => ["x"]].unwrap(), "p1").unwrap();

        let loaded = storage.load("p1").unwrap();
        assert_eq!(loaded.get_column_names(), vec!["b"]);
        assert_eq!(loaded.height(), 1);
        assert_eq!(storage.load_schema("p1").unwrap().unwrap().shape, (1, 1));
    }

    #[test]
    fn test_zero_row_table_keeps_columns() {
        let storage = SqliteStorage::in_memory().unwrap();
        let df = DataFrame::new(vec![Series::new_empty("id", &DataType::Int64)]).unwrap();
        storage.save(&df, "p1").unwrap();

        let loaded = storage.load("p1").unwrap();
        assert_eq!(loaded.shape(), (0, 1));
    }
}
