use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while building a pipeline, before anything runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pipeline name: {0}")]
    InvalidName(String),

    #[error("Pipeline requires at least one collector")]
    NoCollectors,

    #[error("Invalid collector configuration: {0}")]
    Collector(String),

    #[error("Invalid processor configuration: {0}")]
    Processor(String),

    #[error("Invalid storage configuration: {0}")]
    Storage(String),

    #[error("Invalid pipeline configuration: {0}")]
    Definition(String),
}

/// Source errors raised by a collector.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File is empty: {0}")]
    EmptyFile(PathBuf),

    #[error("Failed to parse {source_desc}: {message}")]
    Parse {
        source_desc: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected data format: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table construction error: {0}")]
    Table(String),
}

/// Processing errors raised by a processor.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Column '{column}' not found for {operation}")]
    MissingColumn {
        operation: String,
        column: String,
    },

    #[error("Invalid value in column '{column}': {message}")]
    InvalidValue {
        column: String,
        message: String,
    },

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("Processing task failed: {0}")]
    Task(String),
}

/// Storage errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Refusing to store an empty table for '{0}'")]
    EmptyTable(String),

    #[error("Invalid storage name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Top-level error returned by pipelines and the registry.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Pipeline '{0}' is busy")]
    Busy(String),

    #[error("Collector {index} failed to produce a table: {source}")]
    Collector {
        index: usize,
        #[source]
        source: CollectError,
    },

    #[error("Processor {index} failed: {source}")]
    Processor {
        index: usize,
        #[source]
        source: ProcessError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Pipeline '{0}' not found")]
    NotFound(String),

    #[error("Pipeline with name '{0}' already exists")]
    AlreadyExists(String),
}

/// Coarse classification used by the transport layer to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Admission,
    Source,
    Processing,
    Storage,
    NotFound,
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Config(_) | PipelineError::AlreadyExists(_) => ErrorCategory::Configuration,
            PipelineError::Busy(_) => ErrorCategory::Admission,
            PipelineError::Collector { .. } => ErrorCategory::Source,
            PipelineError::Processor { .. } | PipelineError::Table(_) => ErrorCategory::Processing,
            PipelineError::Storage(_) => ErrorCategory::Storage,
            PipelineError::NotFound(_) => ErrorCategory::NotFound,
        }
    }
}

impl From<polars::error::PolarsError> for ProcessError {
    fn from(err: polars::error::PolarsError) -> Self {
        ProcessError::Polars(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProcessError::Task(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

impl From<polars::error::PolarsError> for StorageError {
    fn from(err: polars::error::PolarsError) -> Self {
        StorageError::Polars(err.to_string())
    }
}

impl From<polars::error::PolarsError> for CollectError {
    fn from(err: polars::error::PolarsError) -> Self {
        CollectError::Table(err.to_string())
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Table(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Sqlite(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
