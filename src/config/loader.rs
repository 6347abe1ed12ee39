//! Load declarations from JSON model files.

use crate::config::ModelConfig;
use crate::error::ConfigError;
use std::path::Path;

/// Read a model file (`{settings?, entities, expose}`) from disk.
pub async fn load_model_file(path: impl AsRef<Path>) -> Result<ModelConfig, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading model file");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse_model(&raw)
}

pub fn parse_model(raw: &str) -> Result<ModelConfig, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::Load(e.to_string()))
}
