//! Depth-bounded serializer: entity graph to a JSON tree following each type's exposed shape.

use crate::error::FieldError;
use crate::manager::Registry;
use crate::store::{Entity, FieldValue, Relation};
use serde_json::{Map, Value};

pub struct Serializer<'a> {
    registry: &'a Registry,
}

impl<'a> Serializer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Serializer { registry }
    }

    /// Depth <= 0 yields the primary-key fields only; negative depth behaves as 0.
    /// Depth is capped at the registry's `max_depth`.
    pub fn serialize(&self, entity: &dyn Entity, depth: i64) -> Value {
        let depth = self.registry.settings().clamp_depth(depth);
        let Some(descriptor) = self.registry.entity(entity.entity_type()) else {
            return Value::String(format!("unregistered entity type: {}", entity.entity_type()));
        };

        let mut out = Map::new();
        if depth <= 0 {
            for pk in &descriptor.pk_columns {
                out.insert(pk.clone(), self.field(entity, pk, 0));
            }
            return Value::Object(out);
        }
        for name in descriptor.shape().names() {
            out.insert(name.to_string(), self.field(entity, name, depth - 1));
        }
        Value::Object(out)
    }

    pub fn serialize_all<'e, I>(&self, entities: I, depth: i64) -> Vec<Value>
    where
        I: IntoIterator<Item = &'e crate::store::EntityRef>,
    {
        entities.into_iter().map(|e| self.serialize(e.as_ref(), depth)).collect()
    }

    fn field(&self, entity: &dyn Entity, name: &str, depth: i64) -> Value {
        match entity.get(name) {
            Ok(FieldValue::Scalar(v)) => v,
            Ok(FieldValue::One(Some(related))) => self.serialize(related.as_ref(), depth),
            Ok(FieldValue::One(None)) => Value::Null,
            Ok(FieldValue::Many(Relation::Materialized(items))) => Value::Array(self.serialize_all(&items, depth)),
            Ok(FieldValue::Many(Relation::Lazy(_))) => Value::String(FieldError::NotLoaded(name.to_string()).to_string()),
            Err(e) => Value::String(e.to_string()),
        }
    }
}
