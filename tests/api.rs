use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use model_api::config::{ColumnConfig, Method, RelationshipConfig, RelationshipSelection, ScalarType, ValidationRule};
use async_trait::async_trait;
use model_api::config::EntityDescriptor;
use model_api::store::{AttributeSet, EntityRef, Query};
use model_api::{
    resource_routes, status_routes, ApiManager, ApiSettings, ApiState, EntityConfig, ExposeConfig, MemoryStore, Store,
    StoreError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn widget() -> EntityConfig {
    EntityConfig::new("Widget")
        .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
        .column(ColumnConfig::new("name", ScalarType::Text))
        .relationship(RelationshipConfig::many("parts", "Part", "widget_id"))
}

fn part() -> EntityConfig {
    EntityConfig::new("Part")
        .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
        .column(ColumnConfig::new("widget_id", ScalarType::Integer))
        .column(ColumnConfig::new("label", ScalarType::Text))
        .relationship(RelationshipConfig::one("widget", "Widget", "widget_id").eager())
}

fn manager() -> ApiManager {
    ApiManager::new(ApiSettings::default()).entity(widget()).entity(part())
}

fn app(manager: ApiManager) -> Router {
    let api = manager.build().unwrap();
    let store = MemoryStore::new(Arc::clone(api.registry()));
    resource_routes(ApiState::new(api, Arc::new(store)))
}

fn full() -> ApiManager {
    manager()
        .expose(ExposeConfig::new("Widget"))
        .expose(ExposeConfig::new("Part"))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed_widgets(app: &Router, names: &[&str]) {
    for name in names {
        let (status, _) = send(app, "POST", "/api/widgets", Some(json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn create_then_list_one_widget() {
    let app = app(manager().expose(ExposeConfig::new("Widget").methods([Method::Get, Method::Post])));

    let (status, body) = send(&app, "POST", "/api/widgets", Some(json!({"name": "foo"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "200 Success");
    assert_eq!(body["content"], json!({"id": 1, "name": "foo"}));
    assert_eq!(body["request"]["method"], "POST");

    let (status, body) = send(&app, "GET", "/api/widgets?limit=1&depth=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"], json!({"total": 1, "returned": 1}));
    assert_eq!(body["content"], json!([{"id": 1, "name": "foo"}]));
    assert_eq!(body["request"]["values"], json!({"limit": "1", "depth": "1"}));
    assert!(body["processing_time"].is_array());
}

#[tokio::test]
async fn default_collection_depth_is_key_only() {
    let app = app(full());
    seed_widgets(&app, &["foo"]).await;
    let (_, body) = send(&app, "GET", "/api/widgets", None).await;
    assert_eq!(body["content"], json!([{"id": 1}]));
}

#[tokio::test]
async fn missing_key_is_not_found() {
    let app = app(full());
    let (status, body) = send(&app, "GET", "/api/widgets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "404 Not Found");
    assert_eq!(body["content"], "No resource found for this ID");
    assert_eq!(body["request"]["base_url"], "/api/widgets/99");

    let (status, _) = send(&app, "DELETE", "/api/widgets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, "GET", "/api/widgets/abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["content"], "No resource found for this ID");
}

fn house_and_cats() -> ApiManager {
    ApiManager::new(ApiSettings::default())
        .entity(
            EntityConfig::new("House")
                .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
                .relationship(RelationshipConfig::many("cats", "Cat", "house_id").eager()),
        )
        .entity(
            EntityConfig::new("Cat")
                .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
                .column(ColumnConfig::new("house_id", ScalarType::Integer))
                .relationship(RelationshipConfig::one("house", "House", "house_id").eager()),
        )
        .expose_all(&[Method::Get, Method::Post], RelationshipSelection::All(true))
}

#[tokio::test]
async fn huge_depth_on_an_eager_cycle_is_capped() {
    let app = app(house_and_cats());
    let (status, _) = send(&app, "POST", "/api/houses", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", "/api/cats", Some(json!({"house_id": 1}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/api/cats/1?depth=200000", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut levels = 0;
    let mut cursor = &body["content"];
    while cursor.get("house").is_some() || cursor.get("cats").is_some() {
        levels += 1;
        cursor = match cursor.get("house") {
            Some(house) => house,
            None => &cursor["cats"][0],
        };
    }
    assert_eq!(levels, ApiSettings::default().max_depth);

    let (status, _) = send(&app, "GET", "/api/houses?depth=200000", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_validation_leaves_the_store_unchanged() {
    let app = app(full().validate(|_, _, method| method != Method::Put));
    seed_widgets(&app, &["foo"]).await;

    let (status, body) = send(&app, "PUT", "/api/widgets/1", Some(json!({"name": "bar"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["content"], "Failed validation");

    let (_, body) = send(&app, "GET", "/api/widgets/1", None).await;
    assert_eq!(body["content"]["name"], "foo");
}

#[tokio::test]
async fn update_and_delete_round_trip() {
    let app = app(full());
    seed_widgets(&app, &["foo"]).await;

    let (status, body) = send(&app, "PUT", "/api/widgets/1", Some(json!({"name": "bar"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], json!({"id": 1, "name": "bar"}));

    let (status, _) = send(&app, "PUT", "/api/widgets/1", Some(json!({"id": 2}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "DELETE", "/api/widgets/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Resource deleted");
    let (status, _) = send(&app, "GET", "/api/widgets/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn write_bodies_are_checked_against_the_declaration() {
    let app = app(manager().expose(ExposeConfig::new("Widget").rule(
        "name",
        ValidationRule {
            required: Some(true),
            ..Default::default()
        },
    )));
    let (status, body) = send(&app, "POST", "/api/widgets", Some(json!({"colour": "red"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["content"], "unknown field: colour");

    let (status, body) = send(&app, "POST", "/api/widgets", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["content"], "name is required");

    let (status, _) = send(&app, "POST", "/api/widgets", Some(json!({"name": 5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authorization_runs_before_the_method_check() {
    let app = app(
        manager()
            .expose(ExposeConfig::new("Widget").methods([Method::Get, Method::Post]))
            .authorize(|_, _, method| method != Method::Post),
    );
    let (status, body) = send(&app, "POST", "/api/widgets", Some(json!({"name": "foo"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["content"], "Not authorized");

    let (status, body) = send(&app, "DELETE", "/api/widgets/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], "405 Method Not Allowed");

    let (status, _) = send(&app, "PATCH", "/api/widgets/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn query_parameters_are_validated() {
    let app = app(full());
    seed_widgets(&app, &["b", "a", "c"]).await;

    let (status, body) = send(&app, "GET", "/api/widgets?colour=red", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["content"], "unknown parameter: colour");

    for bad in ["limit=ten", "offset=1.5", "depth=x", "sort=-createdAt", "loaded=1,x"] {
        let (status, _) = send(&app, "GET", &format!("/api/widgets?{}", bad), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
    }

    let (status, _) = send(&app, "GET", "/api/widgets/1?limit=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sort_ascending_and_descending() {
    let app = app(full());
    seed_widgets(&app, &["b", "a", "c"]).await;

    let names = |body: &Value| -> Vec<String> {
        body["content"]
            .as_array()
            .unwrap()
            .iter()
            .map(|w| w["name"].as_str().unwrap().to_string())
            .collect()
    };
    let (_, body) = send(&app, "GET", "/api/widgets?sort=name&depth=1", None).await;
    assert_eq!(names(&body), vec!["a", "b", "c"]);
    let (_, body) = send(&app, "GET", "/api/widgets?sort=-name&depth=1", None).await;
    assert_eq!(names(&body), vec!["c", "b", "a"]);
}

#[tokio::test]
async fn pagination_and_loaded_exclusion() {
    let app = app(full());
    seed_widgets(&app, &["a", "b", "c", "d", "e"]).await;

    let (_, body) = send(&app, "GET", "/api/widgets?limit=2&offset=4", None).await;
    assert_eq!(body["matches"], json!({"total": 5, "returned": 1}));
    assert_eq!(body["content"], json!([{"id": 5}]));

    let (_, body) = send(&app, "GET", "/api/widgets?loaded=1,2,3", None).await;
    assert_eq!(body["content"], json!([{"id": 4}, {"id": 5}]));

    let (_, body) = send(&app, "GET", "/api/widgets?name=c", None).await;
    assert_eq!(body["matches"]["total"], 1);
    assert_eq!(body["content"], json!([{"id": 3}]));
}

#[tokio::test]
async fn relationship_views_index_by_position() {
    let app = app(full());
    seed_widgets(&app, &["foo"]).await;
    for label in ["x", "y"] {
        let (status, _) = send(&app, "POST", "/api/parts", Some(json!({"widget_id": 1, "label": label}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, "GET", "/api/widgets/1/parts?depth=1&sort=-label", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"]["total"], 2);
    assert_eq!(body["content"][0]["label"], "y");

    let (status, body) = send(&app, "GET", "/api/widgets/1/parts/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"]["label"], "y");

    let (status, body) = send(&app, "GET", "/api/widgets/1/parts/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["content"], "No resource at this position");

    let (status, _) = send(&app, "GET", "/api/widgets/1/parts/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/api/widgets/1/parts/first", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "GET", "/api/widgets/7/parts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/api/widgets/1/parts", Some(json!({"label": "z"}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn every_route_returns_the_same_shape_for_a_type() {
    let app = app(full());
    seed_widgets(&app, &["foo"]).await;
    let (_, created) = send(&app, "POST", "/api/parts", Some(json!({"widget_id": 1, "label": "x"}))).await;

    let keys = |v: &Value| -> Vec<String> {
        let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        k.sort();
        k
    };
    let (_, direct) = send(&app, "GET", "/api/parts/1", None).await;
    let (_, nested) = send(&app, "GET", "/api/widgets/1/parts/1", None).await;
    let (_, listed) = send(&app, "GET", "/api/parts?depth=1", None).await;
    let expected = vec!["id", "label", "widget", "widget_id"];
    assert_eq!(keys(&direct["content"]), expected);
    assert_eq!(keys(&nested["content"]), expected);
    assert_eq!(keys(&listed["content"][0]), expected);
    assert_eq!(keys(&created["content"]), expected);
    assert_eq!(direct["content"]["widget"], json!({"id": 1}));
}

#[tokio::test]
async fn index_lists_authorized_routes_and_models() {
    let app = app(
        manager()
            .expose(ExposeConfig::new("Widget").relationships(RelationshipSelection::All(true)))
            .expose(ExposeConfig::new("Part").methods([Method::Get]))
            .authorize(|entity, _, method| !(entity.name == "Widget" && method == Method::Delete)),
    );
    let (status, body) = send(&app, "GET", "/api", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "200 Welcome");

    let endpoints: Vec<&str> = body["content"]["available_endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap())
        .collect();
    assert!(endpoints.contains(&"/api/widgets/:id (GET, PUT)"));
    assert!(endpoints.contains(&"/api/widgets (GET, POST)"));
    assert!(endpoints.contains(&"/api/widgets/:id/parts (GET)"));
    assert!(endpoints.contains(&"/api/parts (GET)"));

    let models = &body["content"]["available_models"];
    assert_eq!(models["Widget"]["available_columns"], json!(["id", "name"]));
    assert_eq!(models["Widget"]["available_relationships"], json!(["parts"]));
    assert_eq!(models["Part"]["available_relationships"], json!(["widget"]));

    let (status, _) = send(&app, "GET", "/api/", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn url_prefix_comes_from_settings() {
    let settings = ApiSettings {
        url_prefix: "/v2/".into(),
        ..ApiSettings::default()
    };
    let app = app(ApiManager::new(settings).entity(widget()).entity(part()).expose(ExposeConfig::new("Part")));
    let (status, body) = send(&app, "GET", "/v2/parts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"]["total"], 0);
}

#[derive(Debug)]
struct Unreachable;

#[async_trait]
impl Store for Unreachable {
    async fn get(&self, _: &EntityDescriptor, _: &[Value], _: i64) -> Result<Option<EntityRef>, StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }

    fn query(&self, _: &EntityDescriptor) -> Result<Box<dyn Query>, StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }

    async fn create(&self, _: &EntityDescriptor, _: AttributeSet) -> Result<EntityRef, StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }

    async fn update(&self, _: &EntityDescriptor, _: &[Value], _: AttributeSet) -> Result<Option<EntityRef>, StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }

    async fn delete(&self, _: &EntityDescriptor, _: &[Value]) -> Result<bool, StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Other("connection refused".into()))
    }
}

#[tokio::test]
async fn status_routes_use_the_envelope() {
    let api = full().build().unwrap();
    let store = MemoryStore::new(Arc::clone(api.registry()));
    let app = status_routes(ApiState::new(api, Arc::new(store)));

    let (status, body) = send(&app, "GET", "/api/_status/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "200 Success");
    assert_eq!(body["content"], json!({"status": "ok"}));

    let (status, body) = send(&app, "GET", "/api/_status/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], json!({"store": "ok", "entities": {"Widget": "ok", "Part": "ok"}}));

    let (_, body) = send(&app, "GET", "/api/_status/version", None).await;
    assert_eq!(body["content"]["name"], "model-api");
    assert_eq!(body["content"]["entities"], 2);

    let (status, body) = send(&app, "POST", "/api/_status/health", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["content"], "Method Not Allowed");
}

#[tokio::test]
async fn unreachable_store_is_not_ready() {
    let api = full().build().unwrap();
    let app = status_routes(ApiState::new(api, Arc::new(Unreachable)));
    let (status, body) = send(&app, "GET", "/api/_status/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "503 Service Unavailable");
    assert_eq!(body["content"]["store"], "unavailable");
    assert_eq!(body["content"]["entities"]["Widget"], "unavailable");
}

#[tokio::test]
async fn index_rejects_writes_with_the_envelope() {
    let app = app(full());
    let (status, body) = send(&app, "POST", "/api", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], "405 Method Not Allowed");
    assert_eq!(body["request"]["method"], "POST");
}
