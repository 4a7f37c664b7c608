pub mod api;
pub mod collectors;
pub mod config;
pub mod definition;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod processors;
pub mod registry;
pub mod storage;
pub mod table;

pub use config::Settings;
pub use definition::{PipelineConfig, PipelineDefinition};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineSchema, PipelineState, PipelineStats, PipelineStatus};
pub use registry::PipelineRegistry;
