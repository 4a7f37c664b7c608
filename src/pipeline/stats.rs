//! Pipeline Stats - aggregates derived from the execution history

use super::history::ExecutionRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    /// successes / total, 0.0 before the first execution
    pub success_rate: f64,
    /// Mean duration in seconds over all executions
    pub average_duration: f64,
    pub total_rows_processed: usize,
    pub last_execution: Option<ExecutionRecord>,
    /// Error of the most recent failed execution
    pub last_error: Option<String>,
}

impl PipelineStats {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let total = records.len();
        let successful = records.iter().filter(|r| r.is_success()).count();

        let (success_rate, average_duration) = if total == 0 {
            (0.0, 0.0)
        } else {
            let durations: f64 = records.iter().map(|r| r.duration).sum();
            (successful as f64 / total as f64, durations / total as f64)
        };

        Self {
            total_executions: total,
            successful_executions: successful,
            failed_executions: total - successful,
            success_rate,
            average_duration,
            total_rows_processed: records.iter().map(|r| r.rows_processed).sum(),
            last_execution: records.last().cloned(),
            last_error: records
                .iter()
                .rev()
                .find(|r| !r.is_success())
                .and_then(|r| r.error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_no_executions() {
        let stats = PipelineStats::from_records(&[]);
        assert_eq!(stats.total_executions, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_duration, 0.0);
        assert_eq!(stats.total_rows_processed, 0);
        assert!(stats.last_execution.is_none());
        assert!(stats.last_error.is_none());
    }

    #[test]
    fn test_mixed_history() {
        let t0 = Utc::now();
        let records = vec![
            ExecutionRecord::success(t0, t0 + Duration::seconds(2), 10),
            ExecutionRecord::failure(t0, t0 + Duration::seconds(1), 50, "boom".to_string()),
            ExecutionRecord::success(t0, t0 + Duration::seconds(3), 5),
        ];

        let stats = PipelineStats::from_records(&records);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.average_duration, 2.0);
        assert_eq!(stats.total_rows_processed, 15);
        assert_eq!(stats.last_execution.as_ref().unwrap().rows_processed, 5);
        // last_error survives a later success
        assert_eq!(stats.last_error.as_deref(), Some("boom"));
    }
}
