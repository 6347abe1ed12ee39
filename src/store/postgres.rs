//! Postgres store. Tables are named after each type's path segment; eager relationships load in the same statement.

use crate::config::EntityDescriptor;
use crate::error::{FieldError, StoreError};
use crate::manager::Registry;
use crate::sql::{self, Include, QueryBuf, Select};
use crate::store::{AttributeSet, Direction, Entity, EntityRef, FieldValue, Predicate, Query, Relation, Store};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    registry: Arc<Registry>,
}

impl fmt::Debug for PgStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStore").finish_non_exhaustive()
    }
}

fn bind_all(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "pg query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

/// Run a statement returning one JSON column per row.
async fn fetch_json(pool: &PgPool, q: &QueryBuf, column: &str) -> Result<Vec<Value>, StoreError> {
    let rows = bind_all(q).fetch_all(pool).await?;
    rows.iter()
        .map(|r| r.try_get::<Value, _>(column).map_err(StoreError::from))
        .collect()
}

fn key_values(entity: &EntityDescriptor, key_object: &Value) -> Vec<Value> {
    entity
        .pk_columns
        .iter()
        .map(|c| key_object.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Eager includes for `entity`, nested `levels` deep.
fn includes_for<'a>(registry: &'a Registry, entity: &'a EntityDescriptor, levels: i64) -> Vec<Include<'a>> {
    if levels <= 0 {
        return Vec::new();
    }
    entity
        .relationships
        .iter()
        .filter(|r| r.is_eager())
        .filter_map(|r| {
            let target = registry.entity(&r.target)?;
            let nested = includes_for(registry, target, levels - 1);
            let include = if r.is_many() {
                Include {
                    name: &r.name,
                    many: true,
                    target,
                    our_key: entity.pk_columns.first()?,
                    their_key: &r.foreign_key,
                    nested,
                }
            } else {
                Include {
                    name: &r.name,
                    many: false,
                    target,
                    our_key: &r.foreign_key,
                    their_key: target.pk_columns.first()?,
                    nested,
                }
            };
            Some(include)
        })
        .collect()
}

impl PgStore {
    pub fn new(pool: PgPool, registry: Arc<Registry>) -> Self {
        PgStore { pool, registry }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn descriptor(&self, name: &str) -> Result<Arc<EntityDescriptor>, StoreError> {
        self.registry
            .entity(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))
    }

    fn query_for(&self, entity: Arc<EntityDescriptor>) -> PgQuery {
        PgQuery {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            entity,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            include_levels: 1,
        }
    }
}

pub struct PgRecord {
    pool: PgPool,
    registry: Arc<Registry>,
    entity: Arc<EntityDescriptor>,
    row: Map<String, Value>,
    /// Levels of eager includes selected with this row.
    include_levels: i64,
}

impl fmt::Debug for PgRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgRecord")
            .field("entity", &self.entity.name)
            .field("row", &self.row)
            .finish()
    }
}

impl PgRecord {
    /// Wrap a row embedded by an include; it carries one level fewer.
    fn related(&self, target: &Arc<EntityDescriptor>, value: &Value) -> Option<EntityRef> {
        let row = value.as_object()?.clone();
        Some(Arc::new(PgRecord {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            entity: Arc::clone(target),
            row,
            include_levels: self.include_levels - 1,
        }))
    }
}

impl Entity for PgRecord {
    fn entity_type(&self) -> &str {
        &self.entity.name
    }

    fn get(&self, field: &str) -> Result<FieldValue, FieldError> {
        if self.entity.column(field).is_some() {
            return Ok(FieldValue::Scalar(self.row.get(field).cloned().unwrap_or(Value::Null)));
        }
        if let Some(c) = self.entity.computed.iter().find(|c| c.name == field) {
            if c.sql.is_none() {
                return Err(FieldError::Domain(format!("{} has no sql expression", field)));
            }
            return Ok(FieldValue::Scalar(self.row.get(field).cloned().unwrap_or(Value::Null)));
        }
        let rel = self
            .entity
            .relationship(field)
            .ok_or_else(|| FieldError::Unknown(field.to_string()))?;
        let target = self
            .registry
            .entity(&rel.target)
            .ok_or_else(|| FieldError::Domain(format!("unknown entity type: {}", rel.target)))?;

        if rel.is_eager() {
            if self.include_levels <= 0 {
                return Err(FieldError::NotLoaded(field.to_string()));
            }
            let embedded = self.row.get(field).cloned().unwrap_or(Value::Null);
            return Ok(if rel.is_many() {
                let items = embedded
                    .as_array()
                    .map(|items| items.iter().filter_map(|v| self.related(target, v)).collect())
                    .unwrap_or_default();
                FieldValue::Many(Relation::Materialized(items))
            } else {
                FieldValue::One(self.related(target, &embedded))
            });
        }
        if !rel.is_many() {
            return Err(FieldError::NotLoaded(field.to_string()));
        }
        let owner_key = self
            .entity
            .pk_columns
            .first()
            .and_then(|c| self.row.get(c))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(FieldValue::Many(Relation::Lazy(Box::new(PgQuery {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            entity: Arc::clone(target),
            predicates: vec![Predicate::eq(rel.foreign_key.clone(), owner_key)],
            order: Vec::new(),
            limit: None,
            offset: 0,
            include_levels: 1,
        }))))
    }
}

pub struct PgQuery {
    pool: PgPool,
    registry: Arc<Registry>,
    entity: Arc<EntityDescriptor>,
    predicates: Vec<Predicate>,
    order: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: u64,
    include_levels: i64,
}

impl fmt::Debug for PgQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgQuery")
            .field("entity", &self.entity.name)
            .field("predicates", &self.predicates)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("include_levels", &self.include_levels)
            .finish()
    }
}

impl PgQuery {
    fn record(&self, row: Value) -> Option<EntityRef> {
        let Value::Object(row) = row else { return None };
        Some(Arc::new(PgRecord {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            entity: Arc::clone(&self.entity),
            row,
            include_levels: self.include_levels,
        }))
    }
}

#[async_trait]
impl Query for PgQuery {
    fn entity_type(&self) -> &str {
        &self.entity.name
    }

    fn filter(mut self: Box<Self>, predicate: Predicate) -> Box<dyn Query> {
        self.predicates.push(predicate);
        self
    }

    fn order_by(mut self: Box<Self>, column: &str, direction: Direction) -> Box<dyn Query> {
        self.order.push((column.to_string(), direction));
        self
    }

    fn limit(mut self: Box<Self>, n: u64) -> Box<dyn Query> {
        self.limit = Some(n);
        self
    }

    fn offset(mut self: Box<Self>, n: u64) -> Box<dyn Query> {
        self.offset = n;
        self
    }

    fn eager_depth(mut self: Box<Self>, depth: i64) -> Box<dyn Query> {
        self.include_levels = depth.clamp(0, i64::from(self.registry.settings().max_depth));
        self
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let q = sql::count(&Select {
            entity: &self.entity,
            predicates: &self.predicates,
            order: &self.order,
            limit: self.limit,
            offset: self.offset,
            includes: &[],
        });
        let row = bind_all(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get("count")?;
        Ok(n.max(0) as u64)
    }

    async fn fetch(&self) -> Result<Vec<EntityRef>, StoreError> {
        let includes = includes_for(&self.registry, &self.entity, self.include_levels);
        let q = sql::select(&Select {
            entity: &self.entity,
            predicates: &self.predicates,
            order: &self.order,
            limit: self.limit,
            offset: self.offset,
            includes: &includes,
        });
        let rows = fetch_json(&self.pool, &q, "row").await?;
        Ok(rows.into_iter().filter_map(|r| self.record(r)).collect())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, entity: &EntityDescriptor, key: &[Value], depth: i64) -> Result<Option<EntityRef>, StoreError> {
        let descriptor = self.descriptor(&entity.name)?;
        let mut query: Box<dyn Query> = Box::new(self.query_for(descriptor)).eager_depth(depth);
        for (column, value) in entity.pk_columns.iter().zip(key) {
            query = query.filter(Predicate::eq(column.clone(), value.clone()));
        }
        Ok(query.limit(1).fetch().await?.into_iter().next())
    }

    fn query(&self, entity: &EntityDescriptor) -> Result<Box<dyn Query>, StoreError> {
        Ok(Box::new(self.query_for(self.descriptor(&entity.name)?)))
    }

    async fn create(&self, entity: &EntityDescriptor, attributes: AttributeSet) -> Result<EntityRef, StoreError> {
        let q = sql::insert(entity, &attributes);
        let keys = fetch_json(&self.pool, &q, "key").await?;
        let key = keys
            .first()
            .map(|k| key_values(entity, k))
            .ok_or_else(|| StoreError::Other(format!("insert into {} returned no key", entity.name)))?;
        self.get(entity, &key, 0)
            .await?
            .ok_or_else(|| StoreError::Other(format!("created {} is not readable", entity.name)))
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        key: &[Value],
        attributes: AttributeSet,
    ) -> Result<Option<EntityRef>, StoreError> {
        let q = sql::update(entity, key, &attributes);
        let keys = fetch_json(&self.pool, &q, "key").await?;
        match keys.first() {
            Some(k) => self.get(entity, &key_values(entity, k), 0).await,
            None => Ok(None),
        }
    }

    async fn delete(&self, entity: &EntityDescriptor, key: &[Value]) -> Result<bool, StoreError> {
        let q = sql::delete(entity, key);
        let result = bind_all(&q).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
