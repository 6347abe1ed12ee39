//! Per-route dispatcher: authorize, method check, parse, validate, execute, serialize.
//! Every stage returns `Result<_, ApiError>`; the first failure becomes the error envelope.

use crate::config::{EntityDescriptor, Method, RelationshipDescriptor, POSITION_PARAM};
use crate::error::{ApiError, StoreError};
use crate::response::{success_many, success_one, RequestEcho};
use crate::routes::descriptor::{RouteDescriptor, ViewKind};
use crate::serializer::Serializer;
use crate::service::{process, CollectionParams, Processed, RequestValidator, SingletonParams};
use crate::state::ApiState;
use crate::store::{AttributeSet, EntityRef, FieldValue, Relation};
use axum::body::Bytes;
use axum::response::Response;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const NOT_AUTHORIZED: &str = "Not authorized";
pub const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";
pub const FAILED_VALIDATION: &str = "Failed validation";
pub const NO_RESOURCE: &str = "No resource found for this ID";
pub const NO_POSITION: &str = "No resource at this position";
pub const DELETED: &str = "Resource deleted";

/// Everything the transport hands to a route handler. Lives for one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: axum::http::Method,
    pub base_url: String,
    pub path_values: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn echo(&self) -> RequestEcho {
        let mut values = Map::new();
        for (k, v) in &self.query {
            values.insert(k.clone(), Value::String(v.clone()));
        }
        RequestEcho {
            base_url: self.base_url.clone(),
            method: self.method.to_string(),
            values,
        }
    }
}

enum Outcome {
    One(Value),
    Many(Processed),
}

pub async fn dispatch(state: &ApiState, route: &RouteDescriptor, ctx: RequestContext) -> Response {
    tracing::debug!(route = %route.endpoint, method = %ctx.method, url = %ctx.base_url, "dispatch");
    let echo = ctx.echo();
    match handle(state, route, &ctx).await {
        Ok(Outcome::One(content)) => success_one(echo, content),
        Ok(Outcome::Many(p)) => success_many(echo, p.items, p.total, p.processing_time),
        Err(e) => e.into_envelope(echo),
    }
}

async fn handle(state: &ApiState, route: &RouteDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    // methods outside GET/POST/PUT/DELETE never reach the authorize hook
    let method = Method::from_http(&ctx.method).ok_or_else(|| ApiError::MethodNotAllowed(METHOD_NOT_ALLOWED.into()))?;
    if !state.api.is_authorized(&route.entity, route.relationship.as_ref(), method) {
        return Err(ApiError::Unauthorized(NOT_AUTHORIZED.into()));
    }
    if !route.allows(method) {
        return Err(ApiError::MethodNotAllowed(METHOD_NOT_ALLOWED.into()));
    }

    let entity = route.entity.as_ref();
    match (route.kind, route.relationship.as_ref(), method) {
        (ViewKind::Collection, None, Method::Get) => list(state, entity, ctx).await,
        (ViewKind::Collection, None, Method::Post) => create(state, entity, ctx).await,
        (ViewKind::Singleton, None, Method::Get) => read(state, entity, ctx).await,
        (ViewKind::Singleton, None, Method::Put) => update(state, entity, ctx).await,
        (ViewKind::Singleton, None, Method::Delete) => delete(state, entity, ctx).await,
        (ViewKind::Collection, Some(rel), Method::Get) => relationship_list(state, entity, rel, ctx).await,
        (ViewKind::Singleton, Some(rel), Method::Get) => relationship_item(state, entity, rel, ctx).await,
        _ => Err(ApiError::MethodNotAllowed(METHOD_NOT_ALLOWED.into())),
    }
}

/// Primary-key path values in declared order, typed by column.
fn key(entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Vec<Value>, ApiError> {
    let raw = entity
        .pk_columns
        .iter()
        .map(|c| {
            ctx.path_values
                .get(c)
                .map(String::as_str)
                .ok_or_else(|| ApiError::BadRequest(format!("missing key segment: {}", c)))
        })
        .collect::<Result<Vec<&str>, _>>()?;
    entity
        .parse_key(&raw)
        .map_err(|_| ApiError::NotFound(NO_RESOURCE.into()))
}

/// Entity by key, loaded for serialization at `depth`.
async fn owner(state: &ApiState, entity: &EntityDescriptor, key: &[Value], depth: i64) -> Result<EntityRef, ApiError> {
    state
        .store
        .get(entity, key, depth)
        .await?
        .ok_or_else(|| ApiError::NotFound(NO_RESOURCE.into()))
}

/// Key of a stored entity, read back from its primary-key fields.
fn stored_key(entity: &EntityDescriptor, stored: &EntityRef) -> Vec<Value> {
    entity
        .pk_columns
        .iter()
        .map(|c| match stored.get(c) {
            Ok(FieldValue::Scalar(v)) => v,
            _ => Value::Null,
        })
        .collect()
}

fn serialize(state: &ApiState, entity: &EntityRef, depth: i64) -> Value {
    Serializer::new(state.api.registry()).serialize(entity.as_ref(), depth)
}

/// Rule checks from the exposure, then the validate hook.
fn validate(state: &ApiState, entity: &EntityDescriptor, attributes: &AttributeSet, method: Method) -> Result<(), ApiError> {
    if let Some(registration) = state.api.registry().registration(&entity.name) {
        match method {
            Method::Post => RequestValidator::validate(attributes, &registration.validation)?,
            _ => RequestValidator::validate_partial(attributes, &registration.validation)?,
        }
    }
    if !state.api.is_valid(entity, attributes, method) {
        return Err(ApiError::BadRequest(FAILED_VALIDATION.into()));
    }
    Ok(())
}

async fn list(state: &ApiState, entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    let params = CollectionParams::parse(entity, &ctx.query, state.api.settings())?;
    let source = Relation::Lazy(state.store.query(entity)?);
    Ok(Outcome::Many(process(state.api.registry(), entity, source, &params).await?))
}

async fn create(state: &ApiState, entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    let params = SingletonParams::parse(&ctx.query, state.api.settings())?;
    let attributes = RequestValidator::attributes(entity, &ctx.body, Method::Post)?;
    validate(state, entity, &attributes, Method::Post)?;
    let created = state.store.create(entity, attributes).await?;
    tracing::debug!(entity = %entity.name, "created");
    let created = owner(state, entity, &stored_key(entity, &created), params.depth).await?;
    Ok(Outcome::One(serialize(state, &created, params.depth)))
}

async fn read(state: &ApiState, entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    let params = SingletonParams::parse(&ctx.query, state.api.settings())?;
    let key = key(entity, ctx)?;
    let found = owner(state, entity, &key, params.depth).await?;
    Ok(Outcome::One(serialize(state, &found, params.depth)))
}

async fn update(state: &ApiState, entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    let params = SingletonParams::parse(&ctx.query, state.api.settings())?;
    let key = key(entity, ctx)?;
    let attributes = RequestValidator::attributes(entity, &ctx.body, Method::Put)?;
    validate(state, entity, &attributes, Method::Put)?;
    if state.store.update(entity, &key, attributes).await?.is_none() {
        return Err(ApiError::NotFound(NO_RESOURCE.into()));
    }
    let updated = owner(state, entity, &key, params.depth).await?;
    Ok(Outcome::One(serialize(state, &updated, params.depth)))
}

async fn delete(state: &ApiState, entity: &EntityDescriptor, ctx: &RequestContext) -> Result<Outcome, ApiError> {
    SingletonParams::parse(&ctx.query, state.api.settings())?;
    let key = key(entity, ctx)?;
    if !state.store.delete(entity, &key).await? {
        return Err(ApiError::NotFound(NO_RESOURCE.into()));
    }
    Ok(Outcome::One(Value::String(DELETED.into())))
}

/// The owning entity's value for a many-relationship.
fn relation_of(owner: &EntityRef, rel: &RelationshipDescriptor) -> Result<Relation, ApiError> {
    match owner.get(&rel.name) {
        Ok(FieldValue::Many(relation)) => Ok(relation),
        Ok(_) => Err(StoreError::Other(format!("{} did not resolve to a collection", rel.name)).into()),
        Err(e) => Err(StoreError::Other(e.to_string()).into()),
    }
}

fn target<'a>(state: &'a ApiState, rel: &RelationshipDescriptor) -> Result<&'a EntityDescriptor, ApiError> {
    state
        .api
        .registry()
        .entity(&rel.target)
        .map(|e| e.as_ref())
        .ok_or_else(|| StoreError::UnknownEntity(rel.target.clone()).into())
}

async fn relationship_list(
    state: &ApiState,
    entity: &EntityDescriptor,
    rel: &RelationshipDescriptor,
    ctx: &RequestContext,
) -> Result<Outcome, ApiError> {
    let target = target(state, rel)?;
    let params = CollectionParams::parse(target, &ctx.query, state.api.settings())?;
    let key = key(entity, ctx)?;
    // eager members serialize at the collection default, lazy ones at the requested depth
    let item_depth = params
        .depth
        .max(state.api.settings().clamp_depth(i64::from(state.api.settings().default_collection_depth)));
    let owner = owner(state, entity, &key, item_depth + 1).await?;
    let source = relation_of(&owner, rel)?;
    Ok(Outcome::Many(process(state.api.registry(), target, source, &params).await?))
}

/// 1-based position. Non-integers are a parse error; zero or negative an invalid position.
fn position(ctx: &RequestContext) -> Result<u64, ApiError> {
    let raw = ctx
        .path_values
        .get(POSITION_PARAM)
        .ok_or_else(|| ApiError::BadRequest("missing position".into()))?;
    let n: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("position must be an integer, got '{}'", raw)))?;
    if n <= 0 {
        return Err(ApiError::InvalidPosition(format!("position must be at least 1, got {}", n)));
    }
    Ok((n - 1) as u64)
}

async fn relationship_item(
    state: &ApiState,
    entity: &EntityDescriptor,
    rel: &RelationshipDescriptor,
    ctx: &RequestContext,
) -> Result<Outcome, ApiError> {
    let params = SingletonParams::parse(&ctx.query, state.api.settings())?;
    let index = position(ctx)?;
    let key = key(entity, ctx)?;
    let owner = owner(state, entity, &key, params.depth + 1).await?;
    let item = relation_of(&owner, rel)?
        .eager_depth(params.depth)
        .nth(index)
        .await?
        .ok_or_else(|| ApiError::NotFound(NO_POSITION.into()))?;
    Ok(Outcome::One(serialize(state, &item, params.depth)))
}
