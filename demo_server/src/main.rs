//! Demo server: loads a model file and serves the generated API.
//!
//! Run from repo root: `cargo run -p demo-server`
//! Uses Postgres when `DATABASE_URL` is set, the in-memory store otherwise.

use model_api::{
    load_model_file, resource_routes, status_routes, ApiManager, ApiSettings, ApiState, MemoryStore, PgStore,
    Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("model_api=info,demo_server=info")),
        )
        .init();

    let settings = ApiSettings::from_env()?;
    let model_path = std::env::var("MODEL_FILE")
        .unwrap_or_else(|_| concat!(env!("CARGO_MANIFEST_DIR"), "/model.json").into());
    let model = load_model_file(&model_path).await?;

    let api = ApiManager::from_model(model, settings)
        .validate(|entity, attributes, _| {
            entity.name != "Book"
                || attributes
                    .get("title")
                    .and_then(|t| t.as_str())
                    .map_or(true, |t| !t.trim().is_empty())
        })
        .build()?;

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            tracing::info!("using postgres store");
            Arc::new(PgStore::new(pool, Arc::clone(api.registry())))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new(Arc::clone(api.registry())))
        }
    };

    let state = ApiState::new(api, store);
    let app = resource_routes(state.clone()).merge(status_routes(state));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("demo server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
