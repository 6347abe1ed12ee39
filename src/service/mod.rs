//! Request services: the collection query pipeline and write-body validation.

pub mod pipeline;
mod validation;
pub use pipeline::{process, CollectionParams, Processed, SingletonParams};
pub use validation::RequestValidator;
