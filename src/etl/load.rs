//! Loader trait for writing a dataset to a stage sink

use crate::dataset::Dataset;
use crate::error::Result;

/// Loader trait for writing a whole dataset to a destination
///
/// A loader either writes every record or leaves the destination as it
/// found it.
///
/// # Example
/// ```no_run
/// use shopping_etl::dataset::Dataset;
/// use shopping_etl::error::Result;
/// use shopping_etl::etl::Loader;
///
/// struct CountingSink;
///
/// impl Loader for CountingSink {
///     async fn load(&self, dataset: Dataset) -> Result<usize> {
///         Ok(dataset.len())
///     }
/// }
/// ```
pub trait Loader: Send + Sync {
    /// Write the dataset to the destination
    ///
    /// Returns the number of records written
    ///
    /// # Errors
    /// Returns the stage error for the failure (rejected insert, failed write).
    fn load(&self, dataset: Dataset) -> impl std::future::Future<Output = Result<usize>> + Send;
}
