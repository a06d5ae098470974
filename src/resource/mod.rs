//! Resource registry
//!
//! A `Resource` is one destination table fed by one extractor. A `Source`
//! is the ordered set of resources a pipeline loads.

mod types;

pub use types::{Extractor, Resource, Source};
