//! Pipeline State - live cursor of the current or most recent execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress at the end of collection
pub const COLLECTED_PROGRESS: u8 = 50;
/// Progress at the end of processing
pub const PROCESSED_PROGRESS: u8 = 90;
pub const COMPLETE_PROGRESS: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Initialized,
    Collecting,
    Processing,
    Storing,
    Completed,
    Failed,
}

impl PipelineStatus {
    /// True while an execution is in flight
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Collecting | PipelineStatus::Processing | PipelineStatus::Storing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Initialized => "initialized",
            PipelineStatus::Collecting => "collecting",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Storing => "storing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub status: PipelineStatus,
    /// 0..=100, never decreases within one execution
    pub progress: u8,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            status: PipelineStatus::Initialized,
            progress: 0,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Seconds between start and end, once both are known
    pub fn duration(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(seconds_between(start, end)),
            _ => None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
}

/// Progress after `done` of `total` collectors have finished
pub(crate) fn collector_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return COLLECTED_PROGRESS;
    }
    ((done.min(total) * COLLECTED_PROGRESS as usize) / total) as u8
}

/// Progress after `done` of `total` processors have finished
pub(crate) fn processor_progress(done: usize, total: usize) -> u8 {
    let span = (PROCESSED_PROGRESS - COLLECTED_PROGRESS) as usize;
    if total == 0 {
        return PROCESSED_PROGRESS;
    }
    COLLECTED_PROGRESS + ((done.min(total) * span) / total) as u8
}
