pub mod descriptor;
pub mod resource;
pub mod status;

pub use descriptor::{generate, RouteDescriptor, ViewKind};
pub use resource::resource_routes;
pub use status::status_routes;
