//! Core ETL (Extract, Transform, Load) abstractions
//!
//! Each dataset-moving stage is one [`Step`]: an [`Extractor`] reads a
//! [`Dataset`](crate::dataset::Dataset) from the stage's source, a
//! [`Transformer`] edits it in memory, and a [`Loader`] writes it to the
//! stage's sink.

mod extract;
mod load;
mod pipeline;
mod transform;

pub use extract::Extractor;
pub use load::Loader;
pub use pipeline::Step;
pub use transform::{IdentityTransformer, Transformer};
