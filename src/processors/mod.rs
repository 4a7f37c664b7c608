//! Processors - table-to-table transformation steps
//!
//! Missing-column policy differs per processor:
//! - `Cleaner` warns and skips names that are not in the input
//! - `Transformer` fails with `ProcessError::MissingColumn`

pub mod analyzer;
pub mod cleaner;
pub mod transformer;

pub use analyzer::{profile, Analyzer, DatasetProfile, NumericSummary};
pub use cleaner::{Cleaner, CleanerConfig};
pub use transformer::{TransformOp, Transformer};

use crate::error::ProcessError;
use polars::prelude::DataFrame;

/// Processor trait
///
/// Implementations never mutate their input; they return a new frame.
pub trait Processor: Send + Sync {
    fn process(&self, df: &DataFrame) -> Result<DataFrame, ProcessError>;

    /// Processor kind (e.g., "cleaner")
    fn kind(&self) -> &'static str;
}
