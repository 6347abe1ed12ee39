//! Global API defaults: URL prefix, depths and page sizes.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ApiSettings {
    pub url_prefix: String,
    pub default_collection_depth: u32,
    pub default_model_depth: u32,
    pub default_limit: u64,
    /// Unset means page size is unbounded.
    pub max_limit: Option<u64>,
    /// Ceiling for any requested or configured serialization depth.
    pub max_depth: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            url_prefix: "/api".into(),
            default_collection_depth: 0,
            default_model_depth: 1,
            default_limit: 20,
            max_limit: None,
            max_depth: 10,
        }
    }
}

impl ApiSettings {
    /// Read settings from the process environment (`URL_PREFIX`, `DEFAULT_LIMIT`, ...). Missing keys keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = ApiSettings::default();
        for (k, v) in vars {
            let v = v.as_ref().trim();
            match k.as_ref() {
                "URL_PREFIX" => settings.url_prefix = v.to_string(),
                "DEFAULT_COLLECTION_DEPTH" => settings.default_collection_depth = parse_number(k.as_ref(), v)?,
                "DEFAULT_MODEL_DEPTH" => settings.default_model_depth = parse_number(k.as_ref(), v)?,
                "DEFAULT_LIMIT" => settings.default_limit = parse_number(k.as_ref(), v)?,
                "MAX_DEPTH" => settings.max_depth = parse_number(k.as_ref(), v)?,
                "MAX_LIMIT" => {
                    settings.max_limit = if v.is_empty() {
                        None
                    } else {
                        Some(parse_number(k.as_ref(), v)?)
                    }
                }
                _ => {}
            }
        }
        Ok(settings)
    }

    /// Prefix normalized to a leading slash and no trailing slash ("" for the root).
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.url_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Clamp a depth to `[0, max_depth]`.
    pub fn clamp_depth(&self, depth: i64) -> i64 {
        depth.clamp(0, i64::from(self.max_depth))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::Settings(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}
