//! File Collector - reads CSV, JSON or Parquet files from disk

use crate::collectors::{table_from_json, Collector};
use crate::error::{CollectError, ConfigError};
use crate::table;
use async_trait::async_trait;
use csv::ReaderBuilder;
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File format, detected from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") | Some("tsv") | Some("txt") | None => Ok(FileFormat::Csv),
            Some("json") => Ok(FileFormat::Json),
            Some("parquet") | Some("pq") => Ok(FileFormat::Parquet),
            Some(other) => Err(ConfigError::Collector(format!(
                "unsupported file extension '.{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// File Collector - loads a whole file as one table
pub struct FileCollector {
    path: PathBuf,
    uri: String,
    format: FileFormat,
    delimiter: u8,
}

impl FileCollector {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let format = FileFormat::from_path(&path)?;
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        };
        Ok(Self {
            uri: path.display().to_string(),
            path,
            format,
            delimiter,
        })
    }

    /// Override the CSV field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn coerce_cell(s: &str) -> Value {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Number(i.into());
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }

        Value::String(trimmed.to_string())
    }

    fn parse_error(&self, message: impl ToString) -> CollectError {
        CollectError::Parse {
            source_desc: self.uri.clone(),
            message: message.to_string(),
        }
    }

    fn parse_csv(&self, bytes: &[u8]) -> Result<DataFrame, CollectError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .delimiter(self.delimiter)
            .from_reader(bytes);

        let headers = rdr
            .headers()
            .map_err(|e| self.parse_error(format!("failed to read CSV headers: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        for header in &headers {
            if header.is_empty() {
                return Err(self.parse_error("CSV header contains an empty column name"));
            }
            if !seen.insert(header.as_str()) {
                return Err(self.parse_error(format!("duplicate column '{}' in CSV header", header)));
            }
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| self.parse_error(format!("failed to read CSV record: {}", e)))?;
            let mut obj = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let cell = record.get(idx).unwrap_or("");
                obj.insert(header.clone(), Self::coerce_cell(cell));
            }
            rows.push(obj);
        }

        if rows.is_empty() {
            warn!("File {} has a header but no rows", self.uri);
            let columns = headers
                .iter()
                .map(|h| Series::new_empty(h, &DataType::String))
                .collect::<Vec<_>>();
            return Ok(DataFrame::new(columns)?);
        }

        Ok(table::from_records(&rows)?)
    }

    fn parse_json(&self, bytes: &[u8]) -> Result<DataFrame, CollectError> {
        let payload: Value = serde_json::from_slice(bytes).map_err(|e| self.parse_error(e))?;
        table_from_json(&self.uri, payload)
    }

    fn parse_parquet(&self, bytes: Vec<u8>) -> Result<DataFrame, CollectError> {
        ParquetReader::new(Cursor::new(bytes))
            .finish()
            .map_err(|e| self.parse_error(e))
    }
}

#[async_trait]
impl Collector for FileCollector {
    async fn collect(&self) -> Result<DataFrame, CollectError> {
        debug!("Reading {:?} file {}", self.format, self.uri);

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CollectError::FileNotFound(self.path.clone()),
            _ => CollectError::Io(e),
        })?;

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CollectError::EmptyFile(self.path.clone()));
        }

        match self.format {
            FileFormat::Csv => self.parse_csv(&bytes),
            FileFormat::Json => self.parse_json(&bytes),
            FileFormat::Parquet => self.parse_parquet(bytes),
        }
    }

    fn source_type(&self) -> &str {
        "file"
    }

    fn source_uri(&self) -> &str {
        &self.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_path(Path::new("a.csv")).unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path(Path::new("a.JSON")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a.parquet")).unwrap(), FileFormat::Parquet);
        assert!(FileFormat::from_path(Path::new("a.xlsx")).is_err());
    }

    #[test]
    fn test_coerce_cell() {
        assert_eq!(FileCollector::coerce_cell(""), Value::Null);
        assert_eq!(FileCollector::coerce_cell(" 42 "), Value::from(42));
        assert_eq!(FileCollector::coerce_cell("2.5"), Value::from(2.5));
        assert_eq!(FileCollector::coerce_cell("TRUE"), Value::Bool(true));
        assert_eq!(FileCollector::coerce_cell("Alice"), Value::from("Alice"));
    }

    #[tokio::test]
    async fn test_reads_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("people.csv");
        fs::write(&path, "id,name,age\n1,John,25\n2,Jane,\n3,Bob,35\n").unwrap();

        let df = FileCollector::new(&path).unwrap().collect().await.unwrap();
        assert_eq!(df.shape(), (3, 3));
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("name").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("age").unwrap().null_count(), 1);
    }

    #[tokio::test]
    async fn test_header_only_csv_is_zero_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.csv");
        fs::write(&path, "id,name\n").unwrap();

        let df = FileCollector::new(&path).unwrap().collect().await.unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(table::column_names(&df), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_ragged_csv_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ragged.csv");
        fs::write(&path, "a,b\n1,2\n3\n").unwrap();

        let err = FileCollector::new(&path).unwrap().collect().await.unwrap_err();
        assert!(matches!(err, CollectError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.csv");
        let err = FileCollector::new(&missing).unwrap().collect().await.unwrap_err();
        assert!(matches!(err, CollectError::FileNotFound(_)));
        assert!(err.to_string().contains("File not found"));

        let empty = temp_dir.path().join("empty.json");
        fs::write(&empty, "").unwrap();
        let err = FileCollector::new(&empty).unwrap().collect().await.unwrap_err();
        assert!(matches!(err, CollectError::EmptyFile(_)));
    }

    #[tokio::test]
    async fn test_reads_json_and_parquet() {
        let temp_dir = TempDir::new().unwrap();

        let json_path = temp_dir.path().join("rows.json");
        fs::write(&json_path, r#"[{"id": 1, "v": 0.5}, {"id": 2, "v": 1.5}]"#).unwrap();
        let df = FileCollector::new(&json_path).unwrap().collect().await.unwrap();
        assert_eq!(df.shape(), (2, 2));

        let parquet_path = temp_dir.path().join("rows.parquet");
        let mut source = df!["id" => [1i64, 2, 3], "name" => ["a", "b", "c"]].unwrap();
        let mut file = fs::File::create(&parquet_path).unwrap();
        ParquetWriter::new(&mut file).finish(&mut source).unwrap();

        let df = FileCollector::new(&parquet_path).unwrap().collect().await.unwrap();
        assert!(df.equals(&source));
    }
}
