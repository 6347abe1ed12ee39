//! Generated resource routes: one axum route per descriptor, plus the index on the URL prefix.
//! Paths are prefix + descriptor path; every method is accepted and checked by the dispatcher.

use crate::handlers::resource::METHOD_NOT_ALLOWED;
use crate::handlers::{dispatch, index, RequestContext};
use crate::response::RequestEcho;
use crate::routes::descriptor::RouteDescriptor;
use crate::state::ApiState;
use crate::ApiError;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query},
    http::{Method, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Max request body size for write routes (1 MiB).
const BODY_LIMIT: usize = 1024 * 1024;

pub(crate) type RawQuery = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Echo for routes that take no path values or body. A malformed query string echoes no values.
pub(crate) fn request_echo(method: &Method, uri: &Uri, query: RawQuery) -> RequestEcho {
    RequestContext {
        method: method.clone(),
        base_url: uri.path().to_string(),
        path_values: HashMap::new(),
        query: query.map(|Query(q)| q).unwrap_or_default(),
        body: Bytes::new(),
    }
    .echo()
}

async fn serve(
    state: ApiState,
    route: Arc<RouteDescriptor>,
    method: Method,
    uri: Uri,
    path: Option<Path<HashMap<String, String>>>,
    query: RawQuery,
    body: Bytes,
) -> Response {
    let mut ctx = RequestContext {
        method,
        base_url: uri.path().to_string(),
        path_values: path.map(|Path(p)| p).unwrap_or_default(),
        query: Vec::new(),
        body,
    };
    match query {
        Ok(Query(pairs)) => ctx.query = pairs,
        Err(e) => return ApiError::BadRequest(format!("invalid query string: {}", e)).into_envelope(ctx.echo()),
    }
    dispatch(&state, &route, ctx).await
}

fn route_for(state: &ApiState, route: &Arc<RouteDescriptor>) -> axum::routing::MethodRouter {
    let state = state.clone();
    let route = Arc::clone(route);
    any(
        move |method: Method, uri: Uri, path: Option<Path<HashMap<String, String>>>, query: RawQuery, body: Bytes| {
            serve(state.clone(), Arc::clone(&route), method, uri, path, query, body)
        },
    )
}

fn index_route(state: &ApiState) -> axum::routing::MethodRouter {
    let state = state.clone();
    any(move |method: Method, uri: Uri, query: RawQuery| {
        let state = state.clone();
        async move {
            let echo = request_echo(&method, &uri, query);
            if method != Method::GET {
                return ApiError::MethodNotAllowed(METHOD_NOT_ALLOWED.into()).into_envelope(echo);
            }
            index(&state, echo).into_response()
        }
    })
}

/// Router for every generated resource route and the index. Frozen: built from the route table once.
pub fn resource_routes(state: ApiState) -> Router {
    let prefix = state.api.settings().normalized_prefix();
    let mut router = Router::new();
    for route in state.api.routes() {
        router = router.route(&format!("{}{}", prefix, route.path), route_for(&state, route));
    }
    if prefix.is_empty() {
        router = router.route("/", index_route(&state));
    } else {
        router = router
            .route(&prefix, index_route(&state))
            .route(&format!("{}/", prefix), index_route(&state));
    }
    tracing::info!(prefix = %prefix, routes = state.api.routes().len(), "mounted resource routes");
    router.layer(RequestBodyLimitLayer::new(BODY_LIMIT))
}
