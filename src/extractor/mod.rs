//! Entity extraction front-ends.
//!
//! Every front-end produces the same [`ExtractedModel`]; the rest of the
//! pipeline never sees source syntax.

pub mod csharp;
pub mod model_file;

use std::path::Path;

use crate::error::DecompositionResult;
use crate::model::ExtractedModel;

pub use csharp::CSharpEntityExtractor;
pub use model_file::ModelFileExtractor;

/// Turns a monolith source location into an entity model.
pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, source: &Path) -> DecompositionResult<ExtractedModel>;
}

/// Model documents load directly; anything else is treated as a C# tree.
pub fn extractor_for(source: &Path, workers: usize) -> Box<dyn EntityExtractor> {
    if source.is_file() && ModelFileExtractor::supports(source) {
        Box::new(ModelFileExtractor)
    } else {
        Box::new(CSharpEntityExtractor::new(workers))
    }
}
