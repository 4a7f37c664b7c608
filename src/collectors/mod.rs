//! Collectors - produce a table from one external source
//!
//! Implementations:
//! - ApiCollector: JSON REST endpoints
//! - FileCollector: CSV / JSON / Parquet files on disk
//! - ScrapeCollector: repeating elements on an HTML page

pub mod api;
pub mod file;
pub mod scrape;

pub use api::ApiCollector;
pub use file::{FileCollector, FileFormat};
pub use scrape::ScrapeCollector;

use crate::error::CollectError;
use crate::table;
use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde_json::Value;
use tracing::warn;

/// Collector trait
///
/// Configuration is validated when the collector is constructed; `collect`
/// only fails for source problems (unreachable endpoint, malformed payload,
/// missing file). An empty source yields a zero-row table and a warning.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Fetch the source and return it as a table
    async fn collect(&self) -> Result<DataFrame, CollectError>;

    /// Source type (e.g., "api", "file", "web")
    fn source_type(&self) -> &str;

    /// Source URI/endpoint/path
    fn source_uri(&self) -> &str;
}

/// Turn a decoded JSON payload into a table.
///
/// A single object is one row, an array of objects is many rows. `null`,
/// `[]` and `{}` are treated as an empty source.
pub(crate) fn table_from_json(source: &str, payload: Value) -> Result<DataFrame, CollectError> {
    let rows = match payload {
        Value::Null => Vec::new(),
        Value::Object(obj) if obj.is_empty() => Vec::new(),
        Value::Object(obj) => vec![obj],
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(CollectError::Format(format!(
                    "element {} from {} is not an object: {}",
                    idx, source, other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(CollectError::Format(format!(
                "expected a JSON object or array from {}, got {}",
                source, other
            )))
        }
    };

    if rows.is_empty() {
        warn!("No data received from {}", source);
        return Ok(DataFrame::empty());
    }

    Ok(table::from_records(&rows)?)
}
