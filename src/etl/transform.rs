//! Transformer trait for in-memory dataset edits

use crate::dataset::Dataset;
use crate::error::Result;

/// Transformer trait for editing a dataset between extract and load
///
/// Implementors define edits such as:
/// - Column-name sanitization
/// - Deduplication
/// - Null filling
///
/// A transformer never adds or removes columns.
pub trait Transformer: Send + Sync {
    /// Transform the dataset
    ///
    /// # Errors
    /// Returns the stage error if the dataset cannot be transformed
    fn transform(&self, dataset: Dataset) -> Result<Dataset>;
}

/// Identity transformer that passes the dataset through unchanged
///
/// Use this for steps that only move data, such as the staging-table export.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl IdentityTransformer {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for IdentityTransformer {
    fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transformer() {
        let input = Dataset::infer(
            vec!["a".to_string()],
            vec![vec![Some("1".to_string())], vec![None]],
        )
        .unwrap();
        let output = IdentityTransformer::new().transform(input.clone()).unwrap();
        assert_eq!(input, output);
    }
}
