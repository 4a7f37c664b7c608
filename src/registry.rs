//! Pipeline Registry - name-keyed set of live pipelines
//!
//! Owned by whoever serves requests and passed around explicitly; pipelines
//! are shared as `Arc<Pipeline>` so an execution keeps running even if its
//! entry is deleted or replaced meanwhile.

use crate::definition::{PipelineConfig, PipelineDefinition};
use crate::error::{ConfigError, PipelineError, Result};
use crate::pipeline::{Pipeline, PipelineSchema, PipelineState, PipelineStats};
use crate::table;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    /// Parquet base directory for configs that do not name one
    default_storage_dir: PathBuf,
}

impl PipelineRegistry {
    pub fn new(default_storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            default_storage_dir: default_storage_dir.into(),
        }
    }

    pub fn default_storage_dir(&self) -> &PathBuf {
        &self.default_storage_dir
    }

    pub async fn create(&self, config: PipelineConfig) -> Result<()> {
        let definition = PipelineDefinition::from_config(config, &self.default_storage_dir)?;

        let mut pipelines = self.pipelines.write().await;
        if pipelines.contains_key(&definition.name) {
            return Err(PipelineError::AlreadyExists(definition.name));
        }
        let pipeline = definition.build()?;
        pipelines.insert(definition.name.clone(), Arc::new(pipeline));

        info!("Pipeline '{}' created", definition.name);
        Ok(())
    }

    /// Register an already constructed pipeline
    pub async fn insert(&self, pipeline: Pipeline) -> Result<Arc<Pipeline>> {
        let mut pipelines = self.pipelines.write().await;
        if pipelines.contains_key(pipeline.name()) {
            return Err(PipelineError::AlreadyExists(pipeline.name().to_string()));
        }
        let pipeline = Arc::new(pipeline);
        pipelines.insert(pipeline.name().to_string(), pipeline.clone());
        Ok(pipeline)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<Pipeline>> {
        self.pipelines
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }

    pub async fn execute(&self, name: &str) -> Result<String> {
        // The registry lock is released before the run starts
        let pipeline = self.get(name).await?;
        pipeline.execute().await
    }

    pub async fn get_status(&self, name: &str) -> Result<PipelineState> {
        Ok(self.get(name).await?.status())
    }

    /// Latest table as row-oriented records
    pub async fn get_data(&self, name: &str) -> Result<Vec<Map<String, Value>>> {
        let df = self.get(name).await?.get_data()?;
        Ok(table::to_records(&df)?)
    }

    pub async fn get_stats(&self, name: &str) -> Result<PipelineStats> {
        Ok(self.get(name).await?.get_stats())
    }

    pub async fn get_schema(&self, name: &str) -> Result<PipelineSchema> {
        self.get(name).await?.get_schema()
    }

    /// Replace the pipeline registered under `name`.
    ///
    /// The new configuration is validated and built before the old pipeline
    /// is removed, so a bad config leaves the existing one in place. A running
    /// pipeline cannot be replaced.
    pub async fn update(&self, name: &str, config: PipelineConfig) -> Result<()> {
        if config.name != name {
            return Err(ConfigError::Definition("Pipeline name in URL does not match config".to_string()).into());
        }

        let definition = PipelineDefinition::from_config(config, &self.default_storage_dir)?;
        let mut pipelines = self.pipelines.write().await;
        let existing = pipelines
            .get(name)
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))?;
        if existing.status().status.is_running() {
            return Err(PipelineError::Busy(name.to_string()));
        }

        let pipeline = definition.build()?;
        pipelines.insert(name.to_string(), Arc::new(pipeline));
        info!("Pipeline '{}' updated", name);
        Ok(())
    }

    /// Remove from the registry; stored data is left in place
    pub async fn delete(&self, name: &str) -> Result<()> {
        match self.pipelines.write().await.remove(name) {
            Some(_) => {
                info!("Pipeline '{}' deleted", name);
                Ok(())
            }
            None => Err(PipelineError::NotFound(name.to_string())),
        }
    }

    /// Registered names, sorted
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.pipelines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pipelines.read().await.is_empty()
    }
}
