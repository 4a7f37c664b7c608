//! Settings - server configuration from the environment
//!
//! Values come from process environment variables, after loading a `.env`
//! file if one exists. Binaries apply CLI overrides on top.

use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_PROJECT_NAME: &str = "Data Pipeline API";
pub const DEFAULT_STORAGE_DIR: &str = "data";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// PIPELINE_BIND_ADDR
    pub bind_addr: String,
    /// PIPELINE_API_PREFIX
    pub api_prefix: String,
    /// PIPELINE_PROJECT_NAME
    pub project_name: String,
    /// PIPELINE_STORAGE_DIR, used when a pipeline names no storage
    pub storage_dir: PathBuf,
    /// PIPELINE_CORS_ORIGINS, comma-separated; "*" allows any origin
    pub cors_origins: Vec<String>,
    /// PIPELINE_LOG, overridden by RUST_LOG
    pub log_filter: String,
}

impl Settings {
    pub fn new() -> Self {
        Self::from_lookup(|_| None)
    }

    /// Load `.env` (if present) and read the environment
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let mut api_prefix = get("PIPELINE_API_PREFIX", DEFAULT_API_PREFIX);
        if !api_prefix.starts_with('/') {
            api_prefix.insert(0, '/');
        }
        let api_prefix = api_prefix.trim_end_matches('/').to_string();

        Self {
            bind_addr: get("PIPELINE_BIND_ADDR", DEFAULT_BIND_ADDR),
            api_prefix,
            project_name: get("PIPELINE_PROJECT_NAME", DEFAULT_PROJECT_NAME),
            storage_dir: PathBuf::from(get("PIPELINE_STORAGE_DIR", DEFAULT_STORAGE_DIR)),
            cors_origins: get("PIPELINE_CORS_ORIGINS", DEFAULT_CORS_ORIGINS)
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            log_filter: get("PIPELINE_LOG", DEFAULT_LOG_FILTER),
        }
    }

    /// Value for `Access-Control-Allow-Origin`, if the origin is allowed
    pub fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        if self.cors_origins.iter().any(|o| o == "*") {
            return Some("*".to_string());
        }
        let origin = origin?.trim_end_matches('/');
        self.cors_origins
            .iter()
            .find(|o| o.as_str() == origin)
            .cloned()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
