//! In-process store over the registry's declarations. Rows are JSON attribute maps keyed by type name.

use crate::config::{EntityDescriptor, ScalarType};
use crate::error::{FieldError, StoreError};
use crate::manager::Registry;
use crate::store::{AttributeSet, Direction, Entity, EntityRef, FieldValue, Predicate, Query, Relation, Store};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Evaluator for a computed attribute, given the row it belongs to.
pub type Computed = Arc<dyn Fn(&AttributeSet) -> Result<Value, FieldError> + Send + Sync>;

#[derive(Default)]
struct Table {
    rows: Vec<AttributeSet>,
    next_id: i64,
}

struct Inner {
    registry: Arc<Registry>,
    tables: RwLock<HashMap<String, Table>>,
    computed: RwLock<HashMap<(String, String), Computed>>,
}

impl Inner {
    fn descriptor(&self, name: &str) -> Result<&Arc<EntityDescriptor>, StoreError> {
        self.registry
            .entity(name)
            .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))
    }

    fn rows_matching(&self, entity: &str, predicates: &[Predicate]) -> Result<Vec<AttributeSet>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(entity)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|row| predicates.iter().all(|p| matches_predicate(row, p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn record(self: &Arc<Self>, entity: &Arc<EntityDescriptor>, row: AttributeSet) -> EntityRef {
        Arc::new(MemoryRecord {
            inner: Arc::clone(self),
            entity: Arc::clone(entity),
            row,
        })
    }
}

fn poisoned() -> StoreError {
    StoreError::Other("memory store lock poisoned".into())
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new(registry: Arc<Registry>) -> Self {
        MemoryStore {
            inner: Arc::new(Inner {
                registry,
                tables: RwLock::new(HashMap::new()),
                computed: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Attach the evaluator for a declared computed attribute.
    pub fn register_computed<F>(&self, entity: &str, field: &str, f: F) -> Result<(), StoreError>
    where
        F: Fn(&AttributeSet) -> Result<Value, FieldError> + Send + Sync + 'static,
    {
        let mut computed = self.inner.computed.write().map_err(|_| poisoned())?;
        computed.insert((entity.to_string(), field.to_string()), Arc::new(f));
        Ok(())
    }

    /// Number of stored rows of a type.
    pub fn len(&self, entity: &str) -> Result<usize, StoreError> {
        let tables = self.inner.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(entity).map(|t| t.rows.len()).unwrap_or(0))
    }
}

fn key_of(entity: &EntityDescriptor, row: &AttributeSet) -> Vec<Value> {
    entity
        .pk_columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

fn key_matches(entity: &EntityDescriptor, row: &AttributeSet, key: &[Value]) -> bool {
    entity.pk_columns.len() == key.len()
        && entity
            .pk_columns
            .iter()
            .zip(key)
            .all(|(c, v)| row.get(c).map(|x| values_equal(x, v)).unwrap_or(false))
}

fn matches_predicate(row: &AttributeSet, predicate: &Predicate) -> bool {
    let cell = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
    match predicate {
        Predicate::Eq { column, value } => values_equal(&cell(column), value),
        Predicate::NotIn { column, values } => {
            let v = cell(column);
            !values.iter().any(|x| values_equal(&v, x))
        }
    }
}

/// Numbers compare by value (`1` equals `1.0`); everything else structurally.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Sort order: nulls first, then by value within the same JSON kind.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

struct MemoryRecord {
    inner: Arc<Inner>,
    entity: Arc<EntityDescriptor>,
    row: AttributeSet,
}

impl fmt::Debug for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRecord")
            .field("entity", &self.entity.name)
            .field("row", &self.row)
            .finish()
    }
}

impl Entity for MemoryRecord {
    fn entity_type(&self) -> &str {
        &self.entity.name
    }

    fn get(&self, field: &str) -> Result<FieldValue, FieldError> {
        if self.entity.column(field).is_some() {
            return Ok(FieldValue::Scalar(self.row.get(field).cloned().unwrap_or(Value::Null)));
        }
        if self.entity.computed.iter().any(|c| c.name == field) {
            let computed = self
                .inner
                .computed
                .read()
                .map_err(|_| FieldError::Domain("memory store lock poisoned".into()))?;
            let f = computed
                .get(&(self.entity.name.clone(), field.to_string()))
                .ok_or_else(|| FieldError::Domain(format!("no evaluator registered for {}", field)))?;
            return f(&self.row).map(FieldValue::Scalar);
        }
        let rel = self
            .entity
            .relationship(field)
            .ok_or_else(|| FieldError::Unknown(field.to_string()))?;
        let target = self
            .inner
            .descriptor(&rel.target)
            .map_err(|e| FieldError::Domain(e.to_string()))?;

        if !rel.is_many() {
            let fk = self.row.get(&rel.foreign_key).cloned().unwrap_or(Value::Null);
            if fk.is_null() {
                return Ok(FieldValue::One(None));
            }
            let target_key = target.pk_columns.first().cloned().unwrap_or_default();
            let found = self
                .inner
                .rows_matching(&target.name, &[Predicate::eq(target_key, fk)])
                .map_err(|e| FieldError::Domain(e.to_string()))?;
            return Ok(FieldValue::One(
                found.into_iter().next().map(|row| self.inner.record(target, row)),
            ));
        }

        let owner_key = key_of(&self.entity, &self.row).into_iter().next().unwrap_or(Value::Null);
        let query = MemoryQuery::new(Arc::clone(&self.inner), Arc::clone(target))
            .with_predicate(Predicate::eq(rel.foreign_key.clone(), owner_key));
        if rel.is_eager() {
            let rows = query.evaluate().map_err(|e| FieldError::Domain(e.to_string()))?;
            Ok(FieldValue::Many(Relation::Materialized(rows)))
        } else {
            Ok(FieldValue::Many(Relation::Lazy(Box::new(query))))
        }
    }
}

pub struct MemoryQuery {
    inner: Arc<Inner>,
    entity: Arc<EntityDescriptor>,
    predicates: Vec<Predicate>,
    order: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: u64,
}

impl fmt::Debug for MemoryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQuery")
            .field("entity", &self.entity.name)
            .field("predicates", &self.predicates)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl MemoryQuery {
    fn new(inner: Arc<Inner>, entity: Arc<EntityDescriptor>) -> Self {
        MemoryQuery {
            inner,
            entity,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn evaluate(&self) -> Result<Vec<EntityRef>, StoreError> {
        let mut rows = self.inner.rows_matching(&self.entity.name, &self.predicates)?;
        // stable: insertion order breaks ties
        rows.sort_by(|a, b| {
            self.order.iter().fold(Ordering::Equal, |acc, (column, direction)| {
                acc.then_with(|| {
                    let null = Value::Null;
                    let ord = compare_values(a.get(column).unwrap_or(&null), b.get(column).unwrap_or(&null));
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
            })
        });
        let window = rows
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit.map(|l| l as usize).unwrap_or(usize::MAX));
        Ok(window.map(|row| self.inner.record(&self.entity, row)).collect())
    }
}

#[async_trait]
impl Query for MemoryQuery {
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

    fn eager_depth(self: Box<Self>, _depth: i64) -> Box<dyn Query> {
        self
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.evaluate()?.len() as u64)
    }

    async fn fetch(&self) -> Result<Vec<EntityRef>, StoreError> {
        self.evaluate()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, entity: &EntityDescriptor, key: &[Value], _depth: i64) -> Result<Option<EntityRef>, StoreError> {
        let descriptor = self.inner.descriptor(&entity.name)?;
        let tables = self.inner.tables.read().map_err(|_| poisoned())?;
        let row = tables
            .get(&entity.name)
            .and_then(|t| t.rows.iter().find(|row| key_matches(entity, row, key)))
            .cloned();
        Ok(row.map(|row| self.inner.record(descriptor, row)))
    }

    fn query(&self, entity: &EntityDescriptor) -> Result<Box<dyn Query>, StoreError> {
        let descriptor = self.inner.descriptor(&entity.name)?;
        Ok(Box::new(MemoryQuery::new(Arc::clone(&self.inner), Arc::clone(descriptor))))
    }

    async fn create(&self, entity: &EntityDescriptor, attributes: AttributeSet) -> Result<EntityRef, StoreError> {
        let descriptor = self.inner.descriptor(&entity.name)?;
        let mut tables = self.inner.tables.write().map_err(|_| poisoned())?;
        let table = tables.entry(entity.name.clone()).or_default();

        let mut row = AttributeSet::new();
        for col in &entity.columns {
            row.insert(col.name.clone(), attributes.get(&col.name).cloned().unwrap_or(Value::Null));
        }
        for col in entity.pk_infos() {
            let current = row.get(&col.name).cloned().unwrap_or(Value::Null);
            match (&current, col.type_) {
                (Value::Number(n), ScalarType::Integer) => {
                    if let Some(n) = n.as_i64() {
                        table.next_id = table.next_id.max(n);
                    }
                }
                (Value::Null, ScalarType::Integer) => {
                    let next = table
                        .next_id
                        .checked_add(1)
                        .ok_or_else(|| StoreError::KeyExhausted(format!("{}.{}", entity.name, col.name)))?;
                    table.next_id = next;
                    row.insert(col.name.clone(), Value::from(next));
                }
                (Value::Null, ScalarType::Uuid) => {
                    row.insert(col.name.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
                }
                (Value::Null, _) => return Err(StoreError::MissingKey(format!("{}.{}", entity.name, col.name))),
                _ => {}
            }
        }

        let key = key_of(entity, &row);
        if table.rows.iter().any(|r| key_matches(entity, r, &key)) {
            return Err(StoreError::DuplicateKey(entity.name.clone()));
        }
        table.rows.push(row.clone());
        Ok(self.inner.record(descriptor, row))
    }

    async fn update(
        &self,
        entity: &EntityDescriptor,
        key: &[Value],
        attributes: AttributeSet,
    ) -> Result<Option<EntityRef>, StoreError> {
        let descriptor = self.inner.descriptor(&entity.name)?;
        let mut tables = self.inner.tables.write().map_err(|_| poisoned())?;
        let Some(row) = tables
            .get_mut(&entity.name)
            .and_then(|t| t.rows.iter_mut().find(|row| key_matches(entity, row, key)))
        else {
            return Ok(None);
        };
        for (column, value) in attributes {
            if entity.column(&column).is_some() {
                row.insert(column, value);
            }
        }
        let row = row.clone();
        Ok(Some(self.inner.record(descriptor, row)))
    }

    async fn delete(&self, entity: &EntityDescriptor, key: &[Value]) -> Result<bool, StoreError> {
        let mut tables = self.inner.tables.write().map_err(|_| poisoned())?;
        let Some(table) = tables.get_mut(&entity.name) else {
            return Ok(false);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !key_matches(entity, row, key));
        Ok(table.rows.len() != before)
    }
}
