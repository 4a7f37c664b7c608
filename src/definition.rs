//! Pipeline Definition - user configuration and the factory that builds pipelines
//!
//! A request body is first read as a loose `PipelineConfig` (collector and
//! processor entries are kept as raw JSON). `PipelineDefinition::from_config`
//! then validates every entry, so that an unknown collector type or a bad
//! cleaner key is reported as a configuration error naming its position.

use crate::collectors::{ApiCollector, Collector, FileCollector, ScrapeCollector};
use crate::error::ConfigError;
use crate::pipeline::Pipeline;
use crate::processors::{Analyzer, Cleaner, CleanerConfig, Processor, TransformOp, Transformer};
use crate::storage::{ParquetStorage, SqliteStorage, Storage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$")
        .expect("pipeline name pattern is valid");
}

/// Pipeline configuration as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub collectors: Vec<Value>,
    #[serde(default)]
    pub processors: Vec<Value>,
    /// Base directory for Parquet storage
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// Explicit storage binding; takes precedence over `storage_dir`
    #[serde(default)]
    pub storage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CollectorConfig {
    Api {
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    #[serde(alias = "csv")]
    File { file_path: PathBuf },
    #[serde(alias = "scrape")]
    Web {
        url: String,
        css_selectors: HashMap<String, String>,
    },
}

impl CollectorConfig {
    pub fn build(&self) -> Result<Box<dyn Collector>, ConfigError> {
        Ok(match self {
            CollectorConfig::Api { endpoint, headers } => {
                Box::new(ApiCollector::with_headers(endpoint.clone(), headers.clone())?)
            }
            CollectorConfig::File { file_path } => Box::new(FileCollector::new(file_path.clone())?),
            CollectorConfig::Web { url, css_selectors } => {
                Box::new(ScrapeCollector::new(url.clone(), css_selectors.clone())?)
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum ProcessorConfig {
    Cleaner {
        #[serde(default)]
        config: CleanerConfig,
    },
    Analyzer {},
    Transformer {
        #[serde(default)]
        config: Vec<TransformOp>,
    },
}

impl ProcessorConfig {
    pub fn build(&self) -> Result<Box<dyn Processor>, ConfigError> {
        Ok(match self {
            ProcessorConfig::Cleaner { config } => Box::new(Cleaner::new(config.clone())?),
            ProcessorConfig::Analyzer {} => Box::new(Analyzer::new()),
            ProcessorConfig::Transformer { config } => Box::new(Transformer::new(config.clone())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Parquet {
        #[serde(alias = "storage_dir")]
        base_dir: PathBuf,
        #[serde(default)]
        allow_empty: bool,
    },
    Sqlite { path: PathBuf },
}

impl StorageConfig {
    pub fn build(&self) -> Result<Arc<dyn Storage>, ConfigError> {
        Ok(match self {
            StorageConfig::Parquet { base_dir, allow_empty } => {
                Arc::new(ParquetStorage::new(base_dir.clone()).with_allow_empty(*allow_empty))
            }
            StorageConfig::Sqlite { path } => Arc::new(
                SqliteStorage::new(path).map_err(|e| ConfigError::Storage(e.to_string()))?,
            ),
        })
    }
}

/// Validated pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,
    pub collectors: Vec<CollectorConfig>,
    pub processors: Vec<ProcessorConfig>,
    pub storage: StorageConfig,
}

pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    if !NAME_PATTERN.is_match(name) || name.contains("..") {
        return Err(ConfigError::InvalidName(format!(
            "'{}' (use letters, digits, '_', '-' or '.', starting with a letter or digit)",
            name
        )));
    }
    Ok(())
}

impl PipelineDefinition {
    /// Validate a raw config. `default_storage_dir` is used when the config
    /// names neither `storage` nor `storage_dir`.
    pub fn from_config(config: PipelineConfig, default_storage_dir: &Path) -> Result<Self, ConfigError> {
        validate_name(&config.name)?;
        if config.collectors.is_empty() {
            return Err(ConfigError::NoCollectors);
        }

        let collectors = config
            .collectors
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| {
                serde_json::from_value::<CollectorConfig>(raw)
                    .map_err(|e| ConfigError::Collector(format!("collector {}: {}", idx, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let processors = config
            .processors
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| {
                serde_json::from_value::<ProcessorConfig>(raw)
                    .map_err(|e| ConfigError::Processor(format!("processor {}: {}", idx, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let storage = match (config.storage, config.storage_dir) {
            (Some(raw), _) => serde_json::from_value::<StorageConfig>(raw)
                .map_err(|e| ConfigError::Storage(e.to_string()))?,
            (None, Some(dir)) => StorageConfig::Parquet {
                base_dir: dir,
                allow_empty: false,
            },
            (None, None) => StorageConfig::Parquet {
                base_dir: default_storage_dir.to_path_buf(),
                allow_empty: false,
            },
        };

        Ok(Self {
            name: config.name,
            collectors,
            processors,
            storage,
        })
    }

    /// Construct every collector, processor and the storage backend
    pub fn build(&self) -> Result<Pipeline, ConfigError> {
        let collectors = self
            .collectors
            .iter()
            .map(CollectorConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        let processors = self
            .processors
            .iter()
            .map(ProcessorConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        let storage = self.storage.build()?;

        Pipeline::new(self.name.clone(), collectors, processors, storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> PipelineConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_definition() {
        let cfg = config(json!({
            "name": "sales",
            "collectors": [
                {"type": "csv", "file_path": "data/sales.csv"},
                {"type": "api", "endpoint": "https://api.example.com/data", "headers": {"Authorization": "Bearer x"}},
                {"type": "web", "url": "https://example.com", "css_selectors": {"container": ".item", "title": "h2"}}
            ],
            "processors": [
                {"type": "cleaner", "config": {"drop_duplicates": ["id"]}},
                {"type": "analyzer"},
                {"type": "transformer", "config": [{"type": "normalize", "columns": ["value"]}]}
            ],
            "storage_dir": "out"
        }));

        let def = PipelineDefinition::from_config(cfg, Path::new("data")).unwrap();
        assert_eq!(def.collectors.len(), 3);
        assert_eq!(def.processors.len(), 3);
        assert_eq!(
            def.storage,
            StorageConfig::Parquet {
                base_dir: PathBuf::from("out"),
                allow_empty: false
            }
        );

        let pipeline = def.build().unwrap();
        assert_eq!(pipeline.name(), "sales");
        assert_eq!(pipeline.collector_count(), 3);
        assert_eq!(pipeline.processor_count(), 3);
    }

    #[test]
    fn test_unknown_collector_type_names_position() {
        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}, {"type": "ftp", "host": "x"}],
        }));
        let err = PipelineDefinition::from_config(cfg, Path::new("data")).unwrap_err();
        assert!(matches!(err, ConfigError::Collector(ref msg) if msg.starts_with("collector 1")));
    }

    #[test]
    fn test_unknown_processor_and_cleaner_key() {
        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}],
            "processors": [{"type": "aggregator"}],
        }));
        assert!(matches!(
            PipelineDefinition::from_config(cfg, Path::new("data")),
            Err(ConfigError::Processor(_))
        ));

        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}],
            "processors": [{"type": "cleaner", "config": {"dedupe": true}}],
        }));
        assert!(matches!(
            PipelineDefinition::from_config(cfg, Path::new("data")),
            Err(ConfigError::Processor(_))
        ));
    }

    #[test]
    fn test_stray_processor_keys_are_rejected() {
        for processor in [
            json!({"type": "analyzer", "config": {"verbose": true}}),
            json!({"type": "transformer", "config": [{"type": "normalize", "columns": ["a"], "params": {}}]}),
            json!({"type": "transformer", "config": [{"type": "datetime", "columns": ["a"], "params": {"fmt": "%Y"}}]}),
            json!({"type": "cleaner", "options": {}}),
        ] {
            let cfg = config(json!({
                "name": "p",
                "collectors": [{"type": "csv", "file_path": "a.csv"}],
                "processors": [processor],
            }));
            assert!(matches!(
                PipelineDefinition::from_config(cfg, Path::new("data")),
                Err(ConfigError::Processor(ref msg)) if msg.starts_with("processor 0")
            ));
        }

        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}],
            "processors": [{"type": "analyzer"}],
        }));
        assert!(PipelineDefinition::from_config(cfg, Path::new("data")).is_ok());
    }

    #[test]
    fn test_requires_collectors_and_valid_name() {
        let cfg = config(json!({"name": "p", "collectors": []}));
        assert!(matches!(
            PipelineDefinition::from_config(cfg, Path::new("data")),
            Err(ConfigError::NoCollectors)
        ));

        for bad in ["", "../x", "a/b", "-lead"] {
            assert!(validate_name(bad).is_err(), "{bad} should be rejected");
        }
        assert!(validate_name("daily_sales-v2.1").is_ok());
    }

    #[test]
    fn test_web_collector_without_container_fails_at_build() {
        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "web", "url": "https://example.com", "css_selectors": {"title": "h2"}}],
        }));
        let def = PipelineDefinition::from_config(cfg, Path::new("data")).unwrap();
        assert!(matches!(def.build(), Err(ConfigError::Collector(_))));
    }

    #[test]
    fn test_default_and_explicit_storage() {
        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}],
        }));
        let def = PipelineDefinition::from_config(cfg, Path::new("fallback")).unwrap();
        assert!(matches!(def.storage, StorageConfig::Parquet { ref base_dir, .. } if base_dir == Path::new("fallback")));

        let cfg = config(json!({
            "name": "p",
            "collectors": [{"type": "csv", "file_path": "a.csv"}],
            "storage": {"type": "sqlite", "path": "pipelines.db"},
        }));
        let def = PipelineDefinition::from_config(cfg, Path::new("fallback")).unwrap();
        assert_eq!(def.storage, StorageConfig::Sqlite { path: PathBuf::from("pipelines.db") });
    }
}
