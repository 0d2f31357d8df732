//! Extractor trait for reading a dataset from a stage source

use crate::dataset::Dataset;
use crate::error::Result;

/// Extractor trait for reading a whole dataset from a source
///
/// Implementors define how to read from sources like:
/// - Delimited files on local disk
/// - Staging tables in a relational store
/// - Objects in an object store
///
/// # Example
/// ```no_run
/// use shopping_etl::dataset::Dataset;
/// use shopping_etl::error::Result;
/// use shopping_etl::etl::Extractor;
///
/// struct EmptySource;
///
/// impl Extractor for EmptySource {
///     async fn extract(&self) -> Result<Dataset> {
///         Ok(Dataset::default())
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// Read the full dataset from the source
    ///
    /// # Errors
    /// Returns the stage error for the failure (unreadable source, missing
    /// table, unreachable store).
    fn extract(&self) -> impl std::future::Future<Output = Result<Dataset>> + Send;
}
