//! Server Metrics
//!
//! Request and execution counters, rendered in Prometheus text format.

use dashmap::DashMap;
use itertools::Itertools;
use std::fmt::Write;

/// Server metrics tracker
pub struct ServerMetrics {
    /// (method, route template, status) -> count
    requests: DashMap<(String, String, u16), u64>,
    /// outcome -> count
    executions: DashMap<String, u64>,
    /// outcome -> cumulative seconds
    execution_seconds: DashMap<String, f64>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            executions: DashMap::new(),
            execution_seconds: DashMap::new(),
        }
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16) {
        *self
            .requests
            .entry((method.to_string(), route.to_string(), status))
            .or_insert(0) += 1;
    }

    pub fn record_execution(&self, outcome: &str, seconds: f64) {
        *self.executions.entry(outcome.to_string()).or_insert(0) += 1;
        *self.execution_seconds.entry(outcome.to_string()).or_insert(0.0) += seconds;
    }

    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.requests
            .get(&(method.to_string(), route.to_string(), status))
            .map(|v| *v)
            .unwrap_or(0)
    }

    pub fn execution_count(&self, outcome: &str) -> u64 {
        self.executions.get(outcome).map(|v| *v).unwrap_or(0)
    }

    /// Prometheus exposition text
    pub fn render(&self, pipelines: usize) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP pipeline_http_requests_total HTTP requests handled");
        let _ = writeln!(out, "# TYPE pipeline_http_requests_total counter");
        let requests = self
            .requests
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .sorted();
        for ((method, route, status), count) in requests {
            let _ = writeln!(
                out,
                "pipeline_http_requests_total{{method=\"{}\",route=\"{}\",status=\"{}\"}} {}",
                method, route, status, count
            );
        }

        let _ = writeln!(out, "# HELP pipeline_executions_total Pipeline executions by outcome");
        let _ = writeln!(out, "# TYPE pipeline_executions_total counter");
        let executions = self.executions.iter().map(|e| (e.key().clone(), *e.value())).sorted();
        for (outcome, count) in executions {
            let _ = writeln!(out, "pipeline_executions_total{{outcome=\"{}\"}} {}", outcome, count);
        }

        let _ = writeln!(out, "# HELP pipeline_execution_seconds_total Time spent executing pipelines");
        let _ = writeln!(out, "# TYPE pipeline_execution_seconds_total counter");
        let seconds = self
            .execution_seconds
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .sorted_by(|a, b| a.0.cmp(&b.0));
        for (outcome, total) in seconds {
            let _ = writeln!(out, "pipeline_execution_seconds_total{{outcome=\"{}\"}} {:.6}", outcome, total);
        }

        let _ = writeln!(out, "# HELP pipeline_registered Pipelines currently registered");
        let _ = writeln!(out, "# TYPE pipeline_registered gauge");
        let _ = writeln!(out, "pipeline_registered {}", pipelines);
        out
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_render() {
        let metrics = ServerMetrics::new();
        metrics.record_request("GET", "/health", 200);
        metrics.record_request("GET", "/health", 200);
        metrics.record_execution("success", 1.5);
        metrics.record_execution("failed", 0.5);

        assert_eq!(metrics.request_count("GET", "/health", 200), 2);
        assert_eq!(metrics.execution_count("success"), 1);
        assert_eq!(metrics.execution_count("missing"), 0);

        let text = metrics.render(3);
        assert!(text.contains("pipeline_http_requests_total{method=\"GET\",route=\"/health\",status=\"200\"} 2"));
        assert!(text.contains("pipeline_executions_total{outcome=\"failed\"} 1"));
        assert!(text.contains("pipeline_execution_seconds_total{outcome=\"success\"} 1.500000"));
        assert!(text.contains("pipeline_registered 3"));
    }
}
