//! Write-body validation: shape checks against the entity, then per-column rules from the exposure.

use crate::config::{EntityDescriptor, Method, ValidationRule};
use crate::error::ApiError;
use crate::store::AttributeSet;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Parse a write body: a JSON object whose keys are declared columns with values of the column type.
    pub fn attributes(entity: &EntityDescriptor, body: &[u8], method: Method) -> Result<AttributeSet, ApiError> {
        let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(AttributeSet::new())
        } else {
            serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?
        };
        let Value::Object(attributes) = value else {
            return Err(ApiError::BadRequest("body must be a JSON object".into()));
        };
        for (key, v) in &attributes {
            let column = entity
                .column(key)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown field: {}", key)))?;
            if method == Method::Put && column.primary_key {
                return Err(ApiError::BadRequest(format!("{} is part of the primary key", key)));
            }
            if !column.type_.accepts(v) {
                return Err(ApiError::BadRequest(format!(
                    "{} expects a {:?} value",
                    key, column.type_
                )));
            }
        }
        Ok(attributes)
    }

    /// Validate body against per-column rules. All required fields must be present.
    pub fn validate(body: &AttributeSet, rules: &HashMap<String, ValidationRule>) -> Result<(), ApiError> {
        for (col, rule) in rules {
            let val = body.get(col);
            if rule.required == Some(true) && (val.is_none() || val == Some(&Value::Null)) {
                return Err(ApiError::BadRequest(format!("{} is required", col)));
            }
            if let Some(v) = val {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in body (for PUT). Required is not enforced for missing fields.
    pub fn validate_partial(body: &AttributeSet, rules: &HashMap<String, ValidationRule>) -> Result<(), ApiError> {
        for (col, v) in body {
            if let Some(rule) = rules.get(col) {
                validate_field(col, v, rule)?;
            }
        }
        Ok(())
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<(), ApiError> {
    if v.is_null() {
        if rule.required == Some(true) {
            return Err(ApiError::BadRequest(format!("{} is required", col)));
        }
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(ApiError::BadRequest(format!("{} must be at most {} characters", col, max)));
        }
    }
    if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(ApiError::BadRequest(format!("{} must be at least {} characters", col, min)));
        }
    }
    if let Some(ref pattern) = rule.pattern {
        let re = Regex::new(pattern).map_err(|_| ApiError::BadRequest(format!("invalid pattern for {}", col)))?;
        if let Some(s) = v.as_str() {
            if !re.is_match(s) {
                return Err(ApiError::BadRequest(format!("{} does not match required pattern", col)));
            }
        }
    }
    if let Some(ref allowed) = rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(ApiError::BadRequest(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
        if n < min {
            return Err(ApiError::BadRequest(format!("{} must be at least {}", col, min)));
        }
    }
    if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
        if n > max {
            return Err(ApiError::BadRequest(format!("{} must be at most {}", col, max)));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), ApiError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => {
            Err(ApiError::BadRequest(format!("{} must be a valid email", col)))
        }
        "uuid" if uuid::Uuid::parse_str(s).is_err() => {
            Err(ApiError::BadRequest(format!("{} must be a valid UUID", col)))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, EntityConfig, ScalarType};
    use serde_json::json;

    fn widget() -> EntityDescriptor {
        EntityDescriptor::resolve(
            &EntityConfig::new("Widget")
                .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
                .column(ColumnConfig::new("name", ScalarType::Text))
                .column(ColumnConfig::new("email", ScalarType::Text)),
        )
    }

    fn rules() -> HashMap<String, ValidationRule> {
        HashMap::from([
            (
                "name".to_string(),
                ValidationRule {
                    required: Some(true),
                    max_length: Some(5),
                    ..Default::default()
                },
            ),
            (
                "email".to_string(),
                ValidationRule {
                    format: Some("email".into()),
                    ..Default::default()
                },
            ),
        ])
    }

    fn body(v: Value) -> AttributeSet {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn body_must_be_an_object_of_declared_columns() {
        let w = widget();
        assert!(RequestValidator::attributes(&w, br#"{"name":"foo"}"#, Method::Post).is_ok());
        assert!(RequestValidator::attributes(&w, b"", Method::Post).unwrap().is_empty());
        assert!(matches!(
            RequestValidator::attributes(&w, b"[1]", Method::Post),
            Err(ApiError::BadRequest(_))
        ));
        assert!(RequestValidator::attributes(&w, br#"{"colour":"red"}"#, Method::Post).is_err());
        assert!(RequestValidator::attributes(&w, br#"{"name":3}"#, Method::Post).is_err());
    }

    #[test]
    fn put_may_not_reassign_the_key() {
        let w = widget();
        assert!(RequestValidator::attributes(&w, br#"{"id":2}"#, Method::Post).is_ok());
        assert!(RequestValidator::attributes(&w, br#"{"id":2}"#, Method::Put).is_err());
    }

    #[test]
    fn full_validation_enforces_required() {
        let err = RequestValidator::validate(&body(json!({"email": "a@b.c"})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "name is required");
        assert!(RequestValidator::validate(&body(json!({"name": "foo"})), &rules()).is_ok());
    }

    #[test]
    fn partial_validation_only_checks_present_fields() {
        assert!(RequestValidator::validate_partial(&body(json!({"email": "a@b.c"})), &rules()).is_ok());
        let err = RequestValidator::validate_partial(&body(json!({"name": "toolong"})), &rules()).unwrap_err();
        assert_eq!(err.to_string(), "name must be at most 5 characters");
        assert!(RequestValidator::validate_partial(&body(json!({"email": "nope"})), &rules()).is_err());
    }

    #[test]
    fn pattern_allowed_and_range_rules() {
        let rules = HashMap::from([(
            "name".to_string(),
            ValidationRule {
                pattern: Some("^[a-z]+$".into()),
                allowed: Some(vec![json!("foo"), json!("bar")]),
                ..Default::default()
            },
        )]);
        assert!(RequestValidator::validate(&body(json!({"name": "foo"})), &rules).is_ok());
        assert!(RequestValidator::validate(&body(json!({"name": "Foo"})), &rules).is_err());
        assert!(RequestValidator::validate(&body(json!({"name": "baz"})), &rules).is_err());

        let range = HashMap::from([(
            "id".to_string(),
            ValidationRule {
                minimum: Some(1.0),
                maximum: Some(10.0),
                ..Default::default()
            },
        )]);
        assert!(RequestValidator::validate(&body(json!({"id": 0})), &range).is_err());
        assert!(RequestValidator::validate(&body(json!({"id": 10})), &range).is_ok());
    }
}
