//! Standard response envelope: `{status, request, content}` plus match metadata for collections.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

pub const SUCCESS: &str = "200 Success";

/// Echo of the inbound request carried in every envelope.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RequestEcho {
    pub base_url: String,
    pub method: String,
    /// Raw query values as received (last value wins for repeated keys).
    pub values: Map<String, Value>,
}

#[derive(Serialize)]
pub struct Envelope {
    pub status: String,
    pub request: RequestEcho,
    pub content: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Matches {
    pub total: u64,
    pub returned: u64,
}

#[derive(Serialize)]
pub struct CollectionEnvelope {
    pub status: String,
    pub processing_time: Vec<(String, f64)>,
    pub matches: Matches,
    pub request: RequestEcho,
    pub content: Vec<Value>,
}

pub fn success_one(request: RequestEcho, content: Value) -> Response {
    envelope(StatusCode::OK, SUCCESS, request, content)
}

/// Single-payload envelope with an explicit status.
pub fn envelope(status: StatusCode, line: &str, request: RequestEcho, content: Value) -> Response {
    (
        status,
        Json(Envelope {
            status: line.into(),
            request,
            content,
        }),
    )
        .into_response()
}

pub fn success_many(
    request: RequestEcho,
    content: Vec<Value>,
    total: u64,
    processing_time: Vec<(String, f64)>,
) -> Response {
    let returned = content.len() as u64;
    (
        StatusCode::OK,
        Json(CollectionEnvelope {
            status: SUCCESS.into(),
            processing_time,
            matches: Matches { total, returned },
            request,
            content,
        }),
    )
        .into_response()
}
