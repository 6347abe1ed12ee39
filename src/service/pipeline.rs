//! Collection query pipeline: parse control parameters, then filter, count, exclude, sort, window and serialize.

use crate::config::{ApiSettings, EntityDescriptor};
use crate::error::ApiError;
use crate::manager::Registry;
use crate::serializer::Serializer;
use crate::store::{Direction, Predicate, Relation};
use serde_json::Value;
use std::time::Instant;

pub const DEPTH: &str = "depth";
pub const LIMIT: &str = "limit";
pub const OFFSET: &str = "offset";
pub const LOADED: &str = "loaded";
pub const SORT: &str = "sort";

pub const RESERVED_PARAMS: [&str; 5] = [DEPTH, LIMIT, OFFSET, LOADED, SORT];

/// Non-negative integer control value. Negative input clamps to 0; anything non-integer is a client error.
fn parse_count(name: &str, raw: &str) -> Result<u64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map(|n| n.max(0) as u64)
        .map_err(|_| ApiError::BadRequest(format!("{} must be an integer, got '{}'", name, raw)))
}

#[derive(Clone, Debug, PartialEq)]
pub struct CollectionParams {
    /// Equality filters on public columns, values typed by the column.
    pub filters: Vec<(String, Value)>,
    pub offset: u64,
    pub limit: u64,
    pub depth: i64,
    /// Primary-key values the client already holds.
    pub loaded: Vec<Value>,
    pub sort: Option<(String, Direction)>,
}

impl CollectionParams {
    pub fn parse(entity: &EntityDescriptor, query: &[(String, String)], settings: &ApiSettings) -> Result<Self, ApiError> {
        let mut filters = Vec::new();
        let mut control: [Option<&str>; 5] = [None; 5];
        for (key, raw) in query {
            if let Some(col) = entity.public_column(key) {
                let value = col
                    .type_
                    .parse(raw)
                    .map_err(|e| ApiError::BadRequest(format!("{}: {}", key, e)))?;
                filters.push((key.clone(), value));
            } else if let Some(i) = RESERVED_PARAMS.iter().position(|r| r == key) {
                control[i] = Some(raw.as_str());
            } else {
                return Err(ApiError::BadRequest(format!("unknown parameter: {}", key)));
            }
        }
        let [depth, limit, offset, loaded, sort] = control;

        let offset = offset.map(|v| parse_count(OFFSET, v)).transpose()?.unwrap_or(0);
        let mut limit = limit.map(|v| parse_count(LIMIT, v)).transpose()?.unwrap_or(settings.default_limit);
        if let Some(max) = settings.max_limit {
            limit = limit.min(max);
        }
        let depth = depth
            .map(|v| parse_count(DEPTH, v))
            .transpose()?
            .unwrap_or(u64::from(settings.default_collection_depth));
        let depth = settings.clamp_depth(i64::try_from(depth).unwrap_or(i64::MAX));

        let loaded = match loaded {
            Some(raw) => parse_loaded(entity, raw)?,
            None => Vec::new(),
        };

        let sort = match sort {
            Some(raw) => {
                let (column, direction) = match raw.strip_prefix('-') {
                    Some(c) => (c, Direction::Desc),
                    None => (raw, Direction::Asc),
                };
                if entity.public_column(column).is_none() {
                    return Err(ApiError::BadRequest(format!("invalid sort column: {}", column)));
                }
                Some((column.to_string(), direction))
            }
            None => None,
        };

        Ok(CollectionParams {
            filters,
            offset,
            limit,
            depth,
            loaded,
            sort,
        })
    }
}

/// `loaded=1,2,3`: entries parsed with the key column's type.
fn parse_loaded(entity: &EntityDescriptor, raw: &str) -> Result<Vec<Value>, ApiError> {
    let pk = entity
        .single_pk()
        .ok_or_else(|| ApiError::BadRequest(format!("{} has a composite key; loaded is not supported", entity.name)))?;
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            pk.type_
                .parse(s)
                .map_err(|e| ApiError::BadRequest(format!("{}: {}", LOADED, e)))
        })
        .collect()
}

/// Singleton routes accept `depth` only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SingletonParams {
    pub depth: i64,
}

impl SingletonParams {
    pub fn parse(query: &[(String, String)], settings: &ApiSettings) -> Result<Self, ApiError> {
        let mut depth = i64::from(settings.default_model_depth);
        for (key, raw) in query {
            if key != DEPTH {
                return Err(ApiError::BadRequest(format!("unknown parameter: {}", key)));
            }
            depth = i64::try_from(parse_count(DEPTH, raw)?).unwrap_or(i64::MAX);
        }
        Ok(SingletonParams {
            depth: settings.clamp_depth(depth),
        })
    }
}

#[derive(Debug)]
pub struct Processed {
    pub items: Vec<Value>,
    /// Matches after filters, before exclusion and windowing.
    pub total: u64,
    /// Seconds spent per stage.
    pub processing_time: Vec<(String, f64)>,
}

/// Run a collection source through the pipeline. `entity` is the element type of `source`.
pub async fn process(
    registry: &Registry,
    entity: &EntityDescriptor,
    source: Relation,
    params: &CollectionParams,
) -> Result<Processed, ApiError> {
    let serializer = Serializer::new(registry);
    let mut timings = Vec::new();
    let started = Instant::now();

    if source.is_materialized() {
        let total = source.count().await?;
        let items = source.window(params.offset, params.limit).fetch().await?;
        let depth = registry
            .settings()
            .clamp_depth(i64::from(registry.settings().default_collection_depth));
        let content = serializer.serialize_all(&items, depth);
        timings.push(("serialize".to_string(), started.elapsed().as_secs_f64()));
        return Ok(Processed {
            items: content,
            total,
            processing_time: timings,
        });
    }

    let mut source = source;
    for (column, value) in &params.filters {
        source = source.filter(Predicate::eq(column.clone(), value.clone()));
    }
    let total = source.count().await?;
    timings.push(("count".to_string(), started.elapsed().as_secs_f64()));

    if !params.loaded.is_empty() {
        if let Some(pk) = entity.single_pk() {
            source = source.filter(Predicate::not_in(pk.name.clone(), params.loaded.clone()));
        }
    }
    if let Some((column, direction)) = &params.sort {
        source = source.order_by(column, *direction);
    }
    let fetch_started = Instant::now();
    let items = source
        .eager_depth(params.depth)
        .window(params.offset, params.limit)
        .fetch()
        .await?;
    timings.push(("fetch".to_string(), fetch_started.elapsed().as_secs_f64()));

    let serialize_started = Instant::now();
    let content = serializer.serialize_all(&items, params.depth);
    timings.push(("serialize".to_string(), serialize_started.elapsed().as_secs_f64()));

    Ok(Processed {
        items: content,
        total,
        processing_time: timings,
    })
}
