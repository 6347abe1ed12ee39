//! Store seam: entity instances, lazy queries and the persistent store they come from.
//! The resource layer only reads/writes attributes and issues logical query operations through these traits.

mod memory;
mod postgres;

pub use memory::{Computed, MemoryQuery, MemoryStore};
pub use postgres::{PgQuery, PgRecord, PgStore};

use crate::config::EntityDescriptor;
use crate::error::{FieldError, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Proposed column values for a create or update.
pub type AttributeSet = Map<String, Value>;

pub type EntityRef = Arc<dyn Entity>;

/// One entity instance owned by the store, borrowed for the duration of a request.
pub trait Entity: Send + Sync + fmt::Debug {
    /// Registered type name (e.g. "Widget").
    fn entity_type(&self) -> &str;

    /// Value of a column, computed attribute or relationship.
    fn get(&self, field: &str) -> Result<FieldValue, FieldError>;
}

#[derive(Debug)]
pub enum FieldValue {
    Scalar(Value),
    One(Option<EntityRef>),
    Many(Relation),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Eq { column: String, value: Value },
    NotIn { column: String, values: Vec<Value> },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Predicate::Eq {
            column: column.into(),
            value,
        }
    }

    pub fn not_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::NotIn {
            column: column.into(),
            values,
        }
    }
}

/// Lazily evaluated query over one entity type. Builders consume and return the query.
#[async_trait]
pub trait Query: Send + Sync + fmt::Debug {
    fn entity_type(&self) -> &str;

    fn filter(self: Box<Self>, predicate: Predicate) -> Box<dyn Query>;

    fn order_by(self: Box<Self>, column: &str, direction: Direction) -> Box<dyn Query>;

    fn limit(self: Box<Self>, n: u64) -> Box<dyn Query>;

    fn offset(self: Box<Self>, n: u64) -> Box<dyn Query>;

    /// Serialization depth fetched rows must support. Stores that resolve relationships on access ignore it.
    fn eager_depth(self: Box<Self>, depth: i64) -> Box<dyn Query>;

    /// Number of rows `fetch` would return.
    async fn count(&self) -> Result<u64, StoreError>;

    async fn fetch(&self) -> Result<Vec<EntityRef>, StoreError>;
}

/// Runtime value of a "many" relationship (or of a whole collection).
/// Filtering, exclusion and ordering only apply to the lazy variant; materialized lists are already fixed.
#[derive(Debug)]
pub enum Relation {
    Materialized(Vec<EntityRef>),
    Lazy(Box<dyn Query>),
}

impl Relation {
    pub fn is_materialized(&self) -> bool {
        matches!(self, Relation::Materialized(_))
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        match self {
            Relation::Lazy(q) => Relation::Lazy(q.filter(predicate)),
            m => m,
        }
    }

    pub fn order_by(self, column: &str, direction: Direction) -> Self {
        match self {
            Relation::Lazy(q) => Relation::Lazy(q.order_by(column, direction)),
            m => m,
        }
    }

    pub fn eager_depth(self, depth: i64) -> Self {
        match self {
            Relation::Lazy(q) => Relation::Lazy(q.eager_depth(depth)),
            m => m,
        }
    }

    /// Limit then offset on a lazy source; plain slicing on a materialized one.
    pub fn window(self, offset: u64, limit: u64) -> Self {
        match self {
            Relation::Lazy(q) => Relation::Lazy(q.limit(limit).offset(offset)),
            Relation::Materialized(items) => Relation::Materialized(
                items
                    .into_iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .collect(),
            ),
        }
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        match self {
            Relation::Lazy(q) => q.count().await,
            Relation::Materialized(items) => Ok(items.len() as u64),
        }
    }

    pub async fn fetch(self) -> Result<Vec<EntityRef>, StoreError> {
        match self {
            Relation::Lazy(q) => q.fetch().await,
            Relation::Materialized(items) => Ok(items),
        }
    }

    /// Element at a 0-based position, if any.
    pub async fn nth(self, index: u64) -> Result<Option<EntityRef>, StoreError> {
        match self {
            Relation::Lazy(q) => Ok(q.offset(index).limit(1).fetch().await?.into_iter().next()),
            Relation::Materialized(items) => Ok(items.into_iter().nth(index as usize)),
        }
    }
}

/// The persistent store. Keys are typed values in declared primary-key order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Entity with this key, with relationships loaded for serialization at `depth`.
    async fn get(&self, entity: &EntityDescriptor, key: &[Value], depth: i64) -> Result<Option<EntityRef>, StoreError>;

    /// Query over every row of a type.
    fn query(&self, entity: &EntityDescriptor) -> Result<Box<dyn Query>, StoreError>;

    /// Construct, persist and return a new entity; the store assigns missing keys.
    async fn create(&self, entity: &EntityDescriptor, attributes: AttributeSet) -> Result<EntityRef, StoreError>;

    /// Assign attributes on an existing entity. `None` when no entity has that key.
    async fn update(
        &self,
        entity: &EntityDescriptor,
        key: &[Value],
        attributes: AttributeSet,
    ) -> Result<Option<EntityRef>, StoreError>;

    /// Remove an entity. `false` when no entity has that key.
    async fn delete(&self, entity: &EntityDescriptor, key: &[Value]) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
