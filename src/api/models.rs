//! Response bodies

use crate::pipeline::{PipelineState, PipelineStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub message: String,
    pub storage_location: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub project: String,
}

#[derive(Debug, Serialize)]
pub struct PipelineListResponse {
    pub pipelines: Vec<String>,
}

/// Status with the derived duration
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PipelineStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
}

impl From<PipelineState> for StatusResponse {
    fn from(state: PipelineState) -> Self {
        let duration = state.duration();
        Self {
            status: state.status,
            progress: state.progress,
            error: state.error,
            start_time: state.start_time,
            end_time: state.end_time,
            duration,
        }
    }
}
