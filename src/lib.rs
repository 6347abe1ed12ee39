//! Model API: a model-driven REST resource layer. Declared entity types get generated
//! collection, singleton and relationship endpoints over a pluggable store.

pub mod case;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod manager;
pub mod response;
pub mod routes;
pub mod serializer;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_model_file, ApiSettings, EntityConfig, ExposeConfig, ModelConfig};
pub use error::{ApiError, ConfigError, FieldError, StoreError};
pub use hooks::Hooks;
pub use manager::{Api, ApiManager, Registry};
pub use response::{success_many, success_one};
pub use routes::{resource_routes, status_routes};
pub use serializer::Serializer;
pub use state::ApiState;
pub use store::{MemoryStore, PgStore, Store};
