//! Parquet Storage - one directory per pipeline under a base directory
//!
//! Layout:
//! - `<base>/<name>/latest.parquet` (Snappy)
//! - `<base>/<name>/schema.json`

use crate::error::StorageError;
use crate::storage::{validate_name, SchemaDescriptor, Storage};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DATA_FILE: &str = "latest.parquet";
const SCHEMA_FILE: &str = "schema.json";

pub struct ParquetStorage {
    /// Root directory holding one subdirectory per pipeline
    base_dir: PathBuf,
    /// Whether zero-row tables may be saved
    allow_empty: bool,
    compression: ParquetCompression,
}

impl ParquetStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            allow_empty: false,
            compression: ParquetCompression::Snappy,
        }
    }

    /// Accept zero-row tables on save
    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn pipeline_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn data_path(&self, name: &str) -> PathBuf {
        self.pipeline_dir(name).join(DATA_FILE)
    }

    fn schema_path(&self, name: &str) -> PathBuf {
        self.pipeline_dir(name).join(SCHEMA_FILE)
    }

    /// Read the schema sidecar, if the pipeline has been saved
    pub fn load_schema(&self, name: &str) -> Result<Option<SchemaDescriptor>, StorageError> {
        validate_name(name)?;
        let path = self.schema_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write a sibling temp file, then rename it over `target`
    fn replace_file(target: &Path, write: impl FnOnce(&mut File) -> Result<(), StorageError>) -> Result<(), StorageError> {
        let tmp = target.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        if let Err(e) = write(&mut file) {
            drop(file);
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, target)?;
        Ok(())
    }
}

impl Storage for ParquetStorage {
    fn save(&self, df: &DataFrame, name: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        if df.height() == 0 && !self.allow_empty {
            return Err(StorageError::EmptyTable(name.to_string()));
        }

        fs::create_dir_all(self.pipeline_dir(name))?;

        let data_path = self.data_path(name);
        let compression = self.compression;
        Self::replace_file(&data_path, |file| {
            let mut out = df.clone();
            ParquetWriter::new(file).with_compression(compression).finish(&mut out)?;
            Ok(())
        })?;

        let descriptor = SchemaDescriptor::describe(name, df);
        Self::replace_file(&self.schema_path(name), |file| {
            serde_json::to_writer_pretty(file, &descriptor)?;
            Ok(())
        })?;

        info!(
            "Saved {} rows x {} columns for '{}' to {}",
            df.height(),
            df.width(),
            name,
            data_path.display()
        );
        Ok(data_path.display().to_string())
    }

    fn load(&self, name: &str) -> Result<DataFrame, StorageError> {
        validate_name(name)?;
        let path = self.data_path(name);
        if !path.exists() {
            debug!("No stored data for '{}'", name);
            return Ok(DataFrame::empty());
        }
        let file = File::open(&path)?;
        Ok(ParquetReader::new(file).finish()?)
    }

    fn location(&self, name: &str) -> String {
        self.data_path(name).display().to_string()
    }
}
