//! Step orchestration for one dataset-moving stage

use super::{Extractor, Loader, Transformer};
use crate::error::Result;

/// One stage's Extract → Transform → Load flow
///
/// # Type Parameters
/// - `E`: Extractor reading the stage's source
/// - `T`: Transformer applied in memory
/// - `L`: Loader writing the stage's sink
///
/// # Example
/// ```no_run
/// use shopping_etl::etl::{IdentityTransformer, Step};
/// # use shopping_etl::etl::{Extractor, Loader};
/// # use shopping_etl::dataset::Dataset;
/// # use shopping_etl::error::Result;
/// # struct Source;
/// # impl Extractor for Source {
/// #     async fn extract(&self) -> Result<Dataset> { Ok(Dataset::default()) }
/// # }
/// # struct Sink;
/// # impl Loader for Sink {
/// #     async fn load(&self, dataset: Dataset) -> Result<usize> { Ok(dataset.len()) }
/// # }
///
/// # async fn example() -> Result<()> {
/// let step = Step::new("copy", Source, IdentityTransformer, Sink);
/// let count = step.run().await?;
/// println!("Copied {} records", count);
/// # Ok(())
/// # }
/// ```
pub struct Step<E, T, L> {
    name: &'static str,
    extractor: E,
    transformer: T,
    loader: L,
}

impl<E, T, L> Step<E, T, L>
where
    E: Extractor,
    T: Transformer,
    L: Loader,
{
    /// Create a new step
    pub fn new(name: &'static str, extractor: E, transformer: T, loader: L) -> Self {
        Self {
            name,
            extractor,
            transformer,
            loader,
        }
    }

    /// Run the step
    ///
    /// Steps:
    /// 1. Extract the dataset from the source
    /// 2. Transform it
    /// 3. Load it to the sink
    ///
    /// An empty dataset is still loaded, so the sink always reflects the
    /// latest run.
    ///
    /// Returns the number of records loaded
    ///
    /// # Errors
    /// Returns the first stage error; later phases do not run.
    pub async fn run(&self) -> Result<usize> {
        log::info!("Starting {} step", self.name);

        log::debug!("Extracting from source...");
        let dataset = self.extractor.extract().await?;
        log::info!(
            "Extracted {} records with {} columns",
            dataset.len(),
            dataset.schema().len()
        );

        if dataset.is_empty() {
            log::warn!("Source of {} step is empty", self.name);
        }

        log::debug!("Transforming dataset...");
        let transformed = self.transformer.transform(dataset)?;
        log::info!("Transformed to {} records", transformed.len());

        log::debug!("Loading to destination...");
        let count = self.loader.load(transformed).await?;
        log::info!("Loaded {} records", count);

        Ok(count)
    }
}
