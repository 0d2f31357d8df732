//! Dataset transformers
//!
//! - [`ColumnSanitizer`] normalizes column names before staging
//! - [`CleaningPlan`] applies the declarative deduplicate/fill-null set

mod cleaning;
mod sanitize;

pub use cleaning::{CleaningOp, CleaningPlan, FillSpec};
pub use sanitize::ColumnSanitizer;
