//! Execution History - append-only log of past executions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{seconds_between, COMPLETE_PROGRESS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOutcome {
    Success,
    Failed,
}

/// One finished `execute` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds
    pub duration: f64,
    #[serde(rename = "status")]
    pub outcome: ExecutionOutcome,
    pub rows_processed: usize,
    /// Progress when the execution ended (100 on success)
    pub progress: u8,
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn success(start_time: DateTime<Utc>, end_time: DateTime<Utc>, rows_processed: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            end_time,
            duration: seconds_between(start_time, end_time),
            outcome: ExecutionOutcome::Success,
            rows_processed,
            progress: COMPLETE_PROGRESS,
            error: None,
        }
    }

    pub fn failure(start_time: DateTime<Utc>, end_time: DateTime<Utc>, progress: u8, error: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            end_time,
            duration: seconds_between(start_time, end_time),
            outcome: ExecutionOutcome::Failed,
            rows_processed: 0,
            progress,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }
}

#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
