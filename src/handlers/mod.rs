//! HTTP handlers for generated resources and the discovery index.

pub mod index;
pub mod resource;
pub use index::index;
pub use resource::{dispatch, RequestContext};
