//! Column-name sanitization
//!
//! Headers such as `Purchase Amount (USD)` become `Purchase_Amount_USD`, the
//! identifier form the staging table declares.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::etl::Transformer;

/// Transformer that sanitizes every column name
///
/// # Example
/// ```
/// use shopping_etl::etl::Transformer;
/// use shopping_etl::transform::ColumnSanitizer;
/// use shopping_etl::dataset::Dataset;
///
/// let input = Dataset::infer(vec!["Review Rating".to_string()], vec![]).unwrap();
/// let output = ColumnSanitizer::new().transform(input).unwrap();
/// assert_eq!(output.schema().columns()[0].name, "Review_Rating");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnSanitizer;

impl ColumnSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for ColumnSanitizer {
    fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        let schema = dataset.schema().sanitized()?;
        for (before, after) in dataset.schema().names().zip(schema.names()) {
            if before != after {
                log::debug!("Renamed column '{}' to '{}'", before, after);
            }
        }
        dataset.with_schema(schema)
    }
}
