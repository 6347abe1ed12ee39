//! Discovery endpoint on the URL prefix: authorized routes and the exposed shape of every registered type.

use crate::config::{FieldKind, Method};
use crate::response::{Envelope, RequestEcho};
use crate::state::ApiState;
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::{json, Map, Value};

pub const WELCOME: &str = "200 Welcome";

/// `"/api/widgets (GET, POST)"` per route, listing only the methods the caller is authorized for.
pub fn available_endpoints(state: &ApiState) -> Vec<String> {
    let prefix = state.api.settings().normalized_prefix();
    state
        .api
        .routes()
        .iter()
        .filter_map(|route| {
            let methods: Vec<&str> = route
                .methods
                .iter()
                .filter(|m| state.api.is_authorized(&route.entity, route.relationship.as_ref(), **m))
                .map(Method::as_str)
                .collect();
            if methods.is_empty() {
                None
            } else {
                Some(format!("{}{} ({})", prefix, route.path, methods.join(", ")))
            }
        })
        .collect()
}

/// `{Name: {available_columns, available_relationships}}` for every registered type.
pub fn available_models(state: &ApiState) -> Map<String, Value> {
    let mut models = Map::new();
    for registration in state.api.registry().registrations() {
        let entity = &registration.entity;
        let columns: Vec<&str> = entity
            .shape()
            .fields()
            .iter()
            .filter(|f| f.kind != FieldKind::Relationship)
            .map(|f| f.name.as_str())
            .collect();
        let mut relationships: Vec<&str> = entity
            .shape()
            .fields()
            .iter()
            .filter(|f| f.kind == FieldKind::Relationship)
            .map(|f| f.name.as_str())
            .collect();
        for rel in registration.exposed_relationships() {
            if !relationships.contains(&rel.name.as_str()) {
                relationships.push(&rel.name);
            }
        }
        models.insert(
            entity.name.clone(),
            json!({
                "available_columns": columns,
                "available_relationships": relationships,
            }),
        );
    }
    models
}

pub fn index(state: &ApiState, echo: RequestEcho) -> Response {
    tracing::debug!(url = %echo.base_url, "index");
    let body = Envelope {
        status: WELCOME.into(),
        request: echo,
        content: json!({
            "available_endpoints": available_endpoints(state),
            "available_models": available_models(state),
        }),
    };
    (StatusCode::OK, Json(body)).into_response()
}
