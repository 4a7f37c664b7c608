//! Scrape Collector - extracts repeating elements from an HTML page
//!
//! The selector map must contain a `container` entry. Every element matching
//! the container becomes one row; every other entry names a field whose value
//! is the trimmed text of the first matching descendant (null if none).

use crate::collectors::Collector;
use crate::error::{CollectError, ConfigError};
use crate::table;
use async_trait::async_trait;
use polars::prelude::DataFrame;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, error, warn};

pub const CONTAINER_KEY: &str = "container";

pub struct ScrapeCollector {
    url: String,
    container: Selector,
    fields: Vec<(String, Selector)>,
    client: Client,
}

fn parse_selector(key: &str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| {
        ConfigError::Collector(format!("invalid CSS selector for '{}' ({}): {:?}", key, css, e))
    })
}

impl ScrapeCollector {
    pub fn new(url: impl Into<String>, selectors: HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = url.into();
        Url::parse(&url).map_err(|e| ConfigError::Collector(format!("invalid url '{}': {}", url, e)))?;

        let container_css = selectors.get(CONTAINER_KEY).ok_or_else(|| {
            ConfigError::Collector("web collector requires a 'container' selector".to_string())
        })?;
        let container = parse_selector(CONTAINER_KEY, container_css)?;

        // Sorted so column order does not depend on map iteration order
        let mut field_names: Vec<&String> = selectors.keys().filter(|k| *k != CONTAINER_KEY).collect();
        field_names.sort();

        let mut fields = Vec::with_capacity(field_names.len());
        for name in field_names {
            fields.push((name.clone(), parse_selector(name, &selectors[name])?));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::Collector(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            container,
            fields,
            client,
        })
    }

    /// Extract one record per container element
    pub fn extract_rows(&self, html: &str) -> Vec<Map<String, Value>> {
        let document = Html::parse_document(html);
        document
            .select(&self.container)
            .map(|element| {
                let mut row = Map::new();
                for (name, selector) in &self.fields {
                    let value = element
                        .select(selector)
                        .next()
                        .map(|found| Value::String(found.text().collect::<String>().trim().to_string()))
                        .unwrap_or(Value::Null);
                    row.insert(name.clone(), value);
                }
                row
            })
            .collect()
    }
}

#[async_trait]
impl Collector for ScrapeCollector {
    async fn collect(&self) -> Result<DataFrame, CollectError> {
        debug!("Scraping {}", self.url);

        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("Error scraping website {}: {}", self.url, e);
                CollectError::Http(format!("{}: {}", self.url, e))
            })?
            .text()
            .await
            .map_err(|e| CollectError::Http(format!("{}: {}", self.url, e)))?;

        let rows = self.extract_rows(&body);
        if rows.is_empty() {
            warn!("No data extracted from {}", self.url);
            return Ok(DataFrame::empty());
        }

        let df = table::from_records(&rows)?;
        if df.width() == 0 {
            warn!("No fields extracted from {}", self.url);
        }
        Ok(df)
    }

    fn source_type(&self) -> &str {
        "web"
    }

    fn source_uri(&self) -> &str {
        &self.url
    }
}
