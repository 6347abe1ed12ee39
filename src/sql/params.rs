//! Bind values: every parameter goes over the wire as text and is cast to the column type in SQL.

use crate::config::ScalarType;
use serde_json::Value;

/// Postgres type used in `$n::type` casts.
pub fn pg_type(t: ScalarType) -> &'static str {
    match t {
        ScalarType::Integer => "bigint",
        ScalarType::Float => "double precision",
        ScalarType::Text => "text",
        ScalarType::Boolean => "boolean",
        ScalarType::Uuid => "uuid",
        ScalarType::Timestamp => "timestamptz",
        ScalarType::Date => "date",
        ScalarType::Json => "jsonb",
    }
}

/// Text form of a JSON value for a column of type `t`. `None` binds SQL NULL.
pub fn bind_text(t: ScalarType, v: &Value) -> Option<String> {
    match (t, v) {
        (_, Value::Null) => None,
        (ScalarType::Json, other) => Some(other.to_string()),
        (_, Value::String(s)) => Some(s.clone()),
        (_, other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_bind_unquoted_except_for_json_columns() {
        assert_eq!(bind_text(ScalarType::Text, &json!("a")), Some("a".into()));
        assert_eq!(bind_text(ScalarType::Json, &json!("a")), Some("\"a\"".into()));
        assert_eq!(bind_text(ScalarType::Integer, &json!(7)), Some("7".into()));
        assert_eq!(bind_text(ScalarType::Boolean, &json!(true)), Some("true".into()));
        assert_eq!(bind_text(ScalarType::Uuid, &Value::Null), None);
    }
}
