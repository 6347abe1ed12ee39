//! Status routes under `{prefix}/_status`: liveness, per-entity readiness and build info.
//! Every answer uses the standard envelope.

use crate::config::STATUS_SEGMENT;
use crate::error::{status_line, ApiError};
use crate::handlers::resource::METHOD_NOT_ALLOWED;
use crate::response::{envelope, success_one};
use crate::routes::resource::{request_echo, RawQuery};
use crate::state::ApiState;
use axum::{
    http::{Method, StatusCode, Uri},
    response::Response,
    routing::any,
    Router,
};
use serde_json::{json, Map, Value};

const OK: &str = "ok";
const UNAVAILABLE: &str = "unavailable";

#[derive(Clone, Copy, Debug)]
enum Check {
    Health,
    Ready,
    Version,
}

/// Store ping plus an empty count against every exposed entity.
async fn readiness(state: &ApiState) -> (bool, Value) {
    let store = match state.store.ping().await {
        Ok(()) => OK,
        Err(e) => {
            tracing::warn!(error = %e, "store not ready");
            UNAVAILABLE
        }
    };
    let mut ready = store == OK;
    let mut entities = Map::new();
    for registration in state.api.registry().registrations() {
        let entity = &registration.entity;
        let counted = match state.store.query(entity) {
            Ok(query) => query.limit(0).count().await,
            Err(e) => Err(e),
        };
        let availability = match counted {
            Ok(_) => OK,
            Err(e) => {
                tracing::warn!(entity = %entity.name, error = %e, "entity not ready");
                ready = false;
                UNAVAILABLE
            }
        };
        entities.insert(entity.name.clone(), Value::from(availability));
    }
    (ready, json!({ "store": store, "entities": entities }))
}

async fn serve(state: ApiState, check: Check, method: Method, uri: Uri, query: RawQuery) -> Response {
    let echo = request_echo(&method, &uri, query);
    if method != Method::GET {
        return ApiError::MethodNotAllowed(METHOD_NOT_ALLOWED.into()).into_envelope(echo);
    }
    match check {
        Check::Health => success_one(echo, json!({ "status": OK })),
        Check::Ready => {
            let (ready, content) = readiness(&state).await;
            if ready {
                success_one(echo, content)
            } else {
                let status = StatusCode::SERVICE_UNAVAILABLE;
                envelope(status, &status_line(status), echo, content)
            }
        }
        Check::Version => success_one(
            echo,
            json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "entities": state.api.registry().registrations().len(),
                "routes": state.api.routes().len(),
            }),
        ),
    }
}

/// `GET {prefix}/_status/health`, `/ready` and `/version`.
pub fn status_routes(state: ApiState) -> Router {
    let prefix = state.api.settings().normalized_prefix();
    let mut router = Router::new();
    for (name, check) in [("health", Check::Health), ("ready", Check::Ready), ("version", Check::Version)] {
        let state = state.clone();
        router = router.route(
            &format!("{}/{}/{}", prefix, STATUS_SEGMENT, name),
            any(move |method: Method, uri: Uri, query: RawQuery| serve(state.clone(), check, method, uri, query)),
        );
    }
    router
}
