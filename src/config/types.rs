//! Raw declaration types: entity shapes, relationships and exposures as written in model files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Scalar type of a column. Drives parsing of path keys, filters and `loaded` entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Integer,
    Float,
    Text,
    Boolean,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl ScalarType {
    /// Parse a raw string (path segment or query value) into a typed JSON value.
    pub fn parse(self, raw: &str) -> Result<Value, String> {
        match self {
            ScalarType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| format!("expected an integer, got '{}'", raw)),
            ScalarType::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected a number, got '{}'", raw)),
            ScalarType::Text => Ok(Value::String(raw.to_string())),
            ScalarType::Boolean => {
                if raw.eq_ignore_ascii_case("true") || raw == "1" {
                    Ok(Value::Bool(true))
                } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
                    Ok(Value::Bool(false))
                } else {
                    Err(format!("expected a boolean, got '{}'", raw))
                }
            }
            ScalarType::Uuid => uuid::Uuid::parse_str(raw.trim())
                .map(|u| Value::String(u.to_string()))
                .map_err(|_| format!("expected a uuid, got '{}'", raw)),
            ScalarType::Timestamp => chrono::DateTime::parse_from_rfc3339(raw.trim())
                .map(|d| Value::String(d.with_timezone(&chrono::Utc).to_rfc3339()))
                .map_err(|_| format!("expected an RFC 3339 timestamp, got '{}'", raw)),
            ScalarType::Date => chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| format!("expected a date (YYYY-MM-DD), got '{}'", raw)),
            ScalarType::Json => serde_json::from_str(raw).map_err(|e| format!("expected JSON: {}", e)),
        }
    }

    /// Whether a JSON body value may be assigned to a column of this type. Null is always accepted.
    pub fn accepts(self, v: &Value) -> bool {
        match (self, v) {
            (_, Value::Null) => true,
            (ScalarType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ScalarType::Float, Value::Number(_)) => true,
            (ScalarType::Text, Value::String(_)) => true,
            (ScalarType::Boolean, Value::Bool(_)) => true,
            (ScalarType::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s).is_ok(),
            (ScalarType::Timestamp, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            (ScalarType::Date, Value::String(s)) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
            (ScalarType::Json, _) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ScalarType,
    #[serde(default)]
    pub primary_key: bool,
    /// Private columns are never exposed, filtered or sorted on (e.g. password hashes).
    #[serde(default)]
    pub private: bool,
}

impl ColumnConfig {
    pub fn new(name: impl Into<String>, type_: ScalarType) -> Self {
        ColumnConfig {
            name: name.into(),
            type_,
            primary_key: false,
            private: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Eager relationships are inlined in every serialization; lazy ones only reachable as sub-resources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loading {
    Eager,
    #[default]
    Lazy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    /// Name of the target entity type.
    pub target: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub loading: Loading,
    /// `one`: column on this type pointing at the target key. `many`: column on the target pointing at our key.
    pub foreign_key: String,
}

impl RelationshipConfig {
    pub fn many(name: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        RelationshipConfig {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            loading: Loading::Lazy,
            foreign_key: foreign_key.into(),
        }
    }

    pub fn one(name: impl Into<String>, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        RelationshipConfig {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            loading: Loading::Lazy,
            foreign_key: foreign_key.into(),
        }
    }

    pub fn eager(mut self) -> Self {
        self.loading = Loading::Eager;
        self
    }
}

/// Derived read-only attribute. Always part of the exposed shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputedConfig {
    pub name: String,
    /// SQL expression selected by the Postgres store (e.g. `"first_name" || ' ' || "last_name"`).
    #[serde(default)]
    pub sql: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// URL segment and table name. Defaults to the snake_case name plus `s`.
    #[serde(default)]
    pub path_segment: Option<String>,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    #[serde(default)]
    pub computed: Vec<ComputedConfig>,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        EntityConfig {
            name: name.into(),
            path_segment: None,
            columns: Vec::new(),
            relationships: Vec::new(),
            computed: Vec::new(),
        }
    }

    pub fn path_segment(mut self, segment: impl Into<String>) -> Self {
        self.path_segment = Some(segment.into());
        self
    }

    pub fn column(mut self, column: ColumnConfig) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relationship(mut self, rel: RelationshipConfig) -> Self {
        self.relationships.push(rel);
        self
    }

    pub fn computed(mut self, name: impl Into<String>, sql: Option<&str>) -> Self {
        self.computed.push(ComputedConfig {
            name: name.into(),
            sql: sql.map(String::from),
        });
        self
    }
}

/// HTTP methods an exposure may allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Get, Method::Post, Method::Put, Method::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    pub fn from_http(m: &axum::http::Method) -> Option<Self> {
        match *m {
            axum::http::Method::GET => Some(Method::Get),
            axum::http::Method::POST => Some(Method::Post),
            axum::http::Method::PUT => Some(Method::Put),
            axum::http::Method::DELETE => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!("unsupported method: {}", s)),
        }
    }
}

/// Which relationships get sub-resource routes: `true` (all), `false` (none) or an explicit list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipSelection {
    All(bool),
    Only(Vec<String>),
}

impl Default for RelationshipSelection {
    fn default() -> Self {
        RelationshipSelection::All(true)
    }
}

impl RelationshipSelection {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            RelationshipSelection::All(all) => *all,
            RelationshipSelection::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

fn default_methods() -> Vec<Method> {
    Method::ALL.to_vec()
}

/// Endpoint registration for one entity type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExposeConfig {
    pub entity: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub relationships: RelationshipSelection,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

impl ExposeConfig {
    pub fn new(entity: impl Into<String>) -> Self {
        ExposeConfig {
            entity: entity.into(),
            methods: default_methods(),
            relationships: RelationshipSelection::default(),
            validation: HashMap::new(),
        }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn relationships(mut self, selection: RelationshipSelection) -> Self {
        self.relationships = selection;
        self
    }

    pub fn rule(mut self, column: impl Into<String>, rule: ValidationRule) -> Self {
        self.validation.insert(column.into(), rule);
        self
    }
}

/// Everything a model file may contain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub settings: Option<crate::config::ApiSettings>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub expose: Vec<ExposeConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_parse_rejects_non_numeric_integer() {
        assert!(ScalarType::Integer.parse("abc").is_err());
        assert_eq!(ScalarType::Integer.parse("42").unwrap(), serde_json::json!(42));
    }

    #[test]
    fn scalar_parse_normalizes_uuid_and_timestamp() {
        let u = ScalarType::Uuid.parse("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        assert_eq!(u, serde_json::json!("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        let t = ScalarType::Timestamp.parse("2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(t, serde_json::json!("2024-01-02T01:04:05+00:00"));
    }

    #[test]
    fn accepts_checks_json_shape_against_column_type() {
        assert!(ScalarType::Integer.accepts(&serde_json::json!(3)));
        assert!(!ScalarType::Integer.accepts(&serde_json::json!(3.5)));
        assert!(!ScalarType::Text.accepts(&serde_json::json!(3)));
        assert!(ScalarType::Text.accepts(&Value::Null));
        assert!(ScalarType::Json.accepts(&serde_json::json!({"a": [1]})));
    }

    #[test]
    fn expose_config_defaults_from_json() {
        let e: ExposeConfig = serde_json::from_value(serde_json::json!({"entity": "Widget"})).unwrap();
        assert_eq!(e.methods, Method::ALL.to_vec());
        assert_eq!(e.relationships, RelationshipSelection::All(true));

        let e: ExposeConfig = serde_json::from_value(serde_json::json!({
            "entity": "Widget",
            "methods": ["GET", "POST"],
            "relationships": ["parts"]
        }))
        .unwrap();
        assert_eq!(e.methods, vec![Method::Get, Method::Post]);
        assert!(e.relationships.includes("parts"));
        assert!(!e.relationships.includes("owner"));
    }
}
