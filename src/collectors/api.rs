//! API Collector - fetches JSON from a REST endpoint

use crate::collectors::{table_from_json, Collector};
use crate::error::{CollectError, ConfigError};
use async_trait::async_trait;
use polars::prelude::DataFrame;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};

/// API Collector - GETs an endpoint and converts the JSON body into a table
pub struct ApiCollector {
    endpoint: String,
    client: Client,
}

impl ApiCollector {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_headers(endpoint, HashMap::new())
    }

    /// Create with request headers (e.g., Authorization)
    pub fn with_headers(
        endpoint: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)
            .map_err(|e| ConfigError::Collector(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in &headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ConfigError::Collector(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConfigError::Collector(format!("invalid value for header '{}': {}", key, e)))?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(header_map)
            .build()
            .map_err(|e| ConfigError::Collector(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl Collector for ApiCollector {
    async fn collect(&self) -> Result<DataFrame, CollectError> {
        debug!("Fetching {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("HTTP error collecting data from API {}: {}", self.endpoint, e);
                CollectError::Http(format!("{}: {}", self.endpoint, e))
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| CollectError::Http(format!("{}: {}", self.endpoint, e)))?;

        let payload: Value = serde_json::from_str(&body).map_err(|e| {
            error!("Invalid JSON response from API {}: {}", self.endpoint, e);
            CollectError::Format(format!("invalid JSON response from {}: {}", self.endpoint, e))
        })?;

        table_from_json(&self.endpoint, payload)
    }

    fn source_type(&self) -> &str {
        "api"
    }

    fn source_uri(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = ApiCollector::new("not a url");
        assert!(matches!(result, Err(ConfigError::Collector(_))));
    }

    #[test]
    fn test_rejects_invalid_header() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let result = ApiCollector::with_headers("https://api.example.com/data", headers);
        assert!(matches!(result, Err(ConfigError::Collector(_))));
    }

    #[test]
    fn test_accepts_valid_headers() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer test-token".to_string());
        let collector = ApiCollector::with_headers("https://api.example.com/data", headers).unwrap();
        assert_eq!(collector.source_type(), "api");
        assert_eq!(collector.source_uri(), "https://api.example.com/data");
    }
}
