//! Pipeline - sequences collection, processing and storage for one name
//!
//! State machine:
//!
//! ```text
//! initialized -> collecting -> processing -> storing -> completed
//!                     \            |            /
//!                      +-------> failed <------+
//! ```
//!
//! A new execution may start from `initialized`, `completed` or `failed`.
//! Progress runs 0..50 across collectors, 50..90 across processors and
//! 90..100 for the store step. Processors and the store step run on tokio's
//! blocking pool.

pub mod history;
pub mod schema;
pub mod state;
pub mod stats;

pub use history::{ExecutionHistory, ExecutionOutcome, ExecutionRecord};
pub use schema::{ColumnInfo, MemoryUsage, PipelineSchema};
pub use state::{PipelineState, PipelineStatus};
pub use stats::PipelineStats;

use crate::collectors::Collector;
use crate::error::{ConfigError, PipelineError, ProcessError, Result, StorageError};
use crate::processors::Processor;
use crate::storage::Storage;
use crate::table;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use state::{collector_progress, processor_progress, COLLECTED_PROGRESS, COMPLETE_PROGRESS, PROCESSED_PROGRESS};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Buffered state changes per subscriber
const EVENT_CAPACITY: usize = 64;

pub struct Pipeline {
    name: String,
    collectors: Vec<Box<dyn Collector>>,
    processors: Vec<Arc<dyn Processor>>,
    storage: Arc<dyn Storage>,
    state: RwLock<PipelineState>,
    history: Mutex<ExecutionHistory>,
    /// Table produced by the last successful execution
    latest: RwLock<Option<DataFrame>>,
    events: broadcast::Sender<PipelineState>,
}

/// Marks the execution failed if the `execute` future is dropped mid-run
struct ExecutionGuard<'a> {
    pipeline: &'a Pipeline,
    start_time: DateTime<Utc>,
    armed: bool,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(pipeline = %self.pipeline.name, "Execution dropped before finishing");
            self.pipeline
                .record_failure(self.start_time, "Execution cancelled".to_string());
        }
    }
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        collectors: Vec<Box<dyn Collector>>,
        processors: Vec<Box<dyn Processor>>,
        storage: Arc<dyn Storage>,
    ) -> std::result::Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidName("name must not be empty".to_string()));
        }
        if collectors.is_empty() {
            return Err(ConfigError::NoCollectors);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            name,
            collectors,
            processors: processors.into_iter().map(Arc::from).collect(),
            storage,
            state: RwLock::new(PipelineState::new()),
            history: Mutex::new(ExecutionHistory::new()),
            latest: RwLock::new(None),
            events,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Where the storage backend writes this pipeline's table
    pub fn location(&self) -> String {
        self.storage.location(&self.name)
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineState> {
        self.events.subscribe()
    }

    /// Snapshot of the current state
    pub fn status(&self) -> PipelineState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records()
            .to_vec()
    }

    fn update_state(&self, apply: impl FnOnce(&mut PipelineState)) {
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            apply(&mut state);
            state.clone()
        };
        // No subscribers is fine
        let _ = self.events.send(snapshot);
    }

    fn transition(&self, status: PipelineStatus, progress: u8) {
        debug!(pipeline = %self.name, "-> {} ({}%)", status, progress);
        self.update_state(|state| {
            state.status = status;
            state.progress = state.progress.max(progress);
        });
    }

    fn advance(&self, progress: u8) {
        self.update_state(|state| state.progress = state.progress.max(progress));
    }

    /// Admission: the busy check and the move to `collecting` share one lock
    fn begin(&self) -> Result<DateTime<Utc>> {
        let start_time = Utc::now();
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.status.is_running() {
                return Err(PipelineError::Busy(self.name.clone()));
            }
            *state = PipelineState {
                status: PipelineStatus::Collecting,
                progress: 0,
                error: None,
                start_time: Some(start_time),
                end_time: None,
            };
            state.clone()
        };
        let _ = self.events.send(snapshot);
        Ok(start_time)
    }

    fn record_failure(&self, start_time: DateTime<Utc>, message: String) {
        let end_time = Utc::now();
        let progress = self.status().progress;
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ExecutionRecord::failure(start_time, end_time, progress, message.clone()));
        self.update_state(|state| {
            state.status = PipelineStatus::Failed;
            state.error = Some(message);
            state.end_time = Some(end_time);
        });
    }

    async fn run(&self) -> Result<(String, DataFrame)> {
        let total = self.collectors.len();
        let mut tables = Vec::with_capacity(total);
        for (index, collector) in self.collectors.iter().enumerate() {
            debug!(
                pipeline = %self.name,
                "Collecting from {} source {}",
                collector.source_type(),
                collector.source_uri()
            );
            let df = collector
                .collect()
                .await
                .map_err(|source| PipelineError::Collector { index, source })?;
            tables.push(df);
            self.advance(collector_progress(index + 1, total));
        }

        let mut df = table::merge_tables(tables)?;
        if df.height() == 0 {
            warn!(pipeline = %self.name, "Collected data is empty");
        }

        self.transition(PipelineStatus::Processing, COLLECTED_PROGRESS);
        let total = self.processors.len();
        for (index, processor) in self.processors.iter().enumerate() {
            debug!(pipeline = %self.name, "Running {} processor {}", processor.kind(), index);
            let processor = Arc::clone(processor);
            let input = df;
            df = tokio::task::spawn_blocking(move || processor.process(&input))
                .await
                .map_err(ProcessError::from)
                .and_then(|result| result)
                .map_err(|source| PipelineError::Processor { index, source })?;
            self.advance(processor_progress(index + 1, total));
        }

        self.transition(PipelineStatus::Storing, PROCESSED_PROGRESS);
        let storage = Arc::clone(&self.storage);
        let name = self.name.clone();
        let saved = tokio::task::spawn_blocking(move || storage.save(&df, &name).map(|location| (location, df)))
            .await
            .map_err(StorageError::from)??;
        Ok(saved)
    }

    /// Run every collector, then every processor, then store the result.
    ///
    /// Returns the storage location. Fails with `PipelineError::Busy` if an
    /// execution is already in flight; every other failure is recorded in
    /// the history before it is returned.
    pub async fn execute(&self) -> Result<String> {
        let start_time = self.begin()?;
        info!(pipeline = %self.name, "Starting pipeline execution");

        let mut guard = ExecutionGuard {
            pipeline: self,
            start_time,
            armed: true,
        };
        let result = self.run().await;
        guard.armed = false;

        match result {
            Ok((location, df)) => {
                let end_time = Utc::now();
                let rows = df.height();
                *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(df);
                self.history
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(ExecutionRecord::success(start_time, end_time, rows));
                self.update_state(|state| {
                    state.status = PipelineStatus::Completed;
                    state.progress = COMPLETE_PROGRESS;
                    state.end_time = Some(end_time);
                });
                info!(pipeline = %self.name, rows, "Pipeline execution completed: {}", location);
                Ok(location)
            }
            Err(err) => {
                error!(pipeline = %self.name, "Pipeline execution failed: {}", err);
                self.record_failure(start_time, err.to_string());
                Err(err)
            }
        }
    }

    /// Latest table, falling back to storage when nothing is cached
    pub fn get_data(&self) -> Result<DataFrame> {
        if let Some(df) = self.latest.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(df.clone());
        }
        Ok(self.storage.load(&self.name)?)
    }

    pub fn get_stats(&self) -> PipelineStats {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        PipelineStats::from_records(history.records())
    }

    pub fn get_schema(&self) -> Result<PipelineSchema> {
        let df = self.get_data()?;
        Ok(PipelineSchema::from_frame(&df)?)
    }
}
