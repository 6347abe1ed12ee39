//! Typed errors and HTTP mapping.

use crate::response::{Envelope, RequestEcho};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Startup-time declaration errors. Fatal: the API is never built.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key for {entity}: {reason}")]
    InvalidPrimaryKey { entity: String, reason: String },
    #[error("duplicate entity name: {0}")]
    DuplicateEntity(String),
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("relationship {entity}.{relationship}: {reason}")]
    InvalidRelationship {
        entity: String,
        relationship: String,
        reason: String,
    },
    #[error("settings: {0}")]
    Settings(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Per-field resolution failure. The serializer inlines its message instead of failing the response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("unknown field: {0}")]
    Unknown(String),
    #[error("relationship {0} is not loaded")]
    NotLoaded(String),
    #[error("{0}")]
    Domain(String),
}

/// Failures raised by a store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
    #[error("missing primary key value for {0}")]
    MissingKey(String),
    #[error("duplicate primary key for {0}")]
    DuplicateKey(String),
    #[error("no integer key left to assign for {0}")]
    KeyExhausted(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// Zero or negative relationship position. Distinct from an empty valid position, same status.
    #[error("{0}")]
    InvalidPosition(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::InvalidPosition(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client. Store internals are never echoed.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Store(_) => "Internal error".into(),
            other => other.to_string(),
        }
    }

    /// Error response in the standard envelope, echoing the original request.
    pub fn into_envelope(self, request: RequestEcho) -> Response {
        let status = self.status();
        match &self {
            ApiError::Store(e) => tracing::error!(error = %e, url = %request.base_url, "store failure"),
            other => tracing::warn!(status = status.as_u16(), message = %other, url = %request.base_url, "request rejected"),
        }
        let body = Envelope {
            status: status_line(status),
            request,
            content: serde_json::Value::String(self.client_message()),
        };
        (status, Json(body)).into_response()
    }
}

/// "404 Not Found" style status string used in envelopes.
pub fn status_line(status: StatusCode) -> String {
    format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
        .trim_end()
        .to_string()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_envelope(RequestEcho::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_kinds_map_to_their_status_codes() {
        assert_eq!(ApiError::Unauthorized("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::MethodNotAllowed("x".into()).status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::InvalidPosition("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_errors_are_not_echoed() {
        let e = ApiError::from(StoreError::Other("connection refused at 10.0.0.3".into()));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.client_message(), "Internal error");
    }

    #[test]
    fn status_line_includes_reason() {
        assert_eq!(status_line(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(status_line(StatusCode::OK), "200 OK");
    }
}
