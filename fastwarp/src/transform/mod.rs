//! Transform contexts: how destination pixels map to source pixels, and how
//! those mappings are approximated, sized and cached.

mod approx;
mod cache;
mod context;
mod suggest;

pub use approx::ApproxTransformer;
pub use cache::{SharedTransformCache, TransformContextCache, TransformKey};
pub use context::{SourceGeoreference, TransformContext};
pub use suggest::{SuggestedOutput, suggest_output};
