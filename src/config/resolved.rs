//! Resolved entity model: declarations validated and flattened for runtime use.
//! Each descriptor carries its exposed shape, computed once when the registry is built.

use crate::case::default_path_segment;
use crate::config::{Cardinality, ComputedConfig, EntityConfig, Loading, RelationshipConfig, ScalarType};
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub type_: ScalarType,
    pub primary_key: bool,
    pub private: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub loading: Loading,
    pub foreign_key: String,
}

impl RelationshipDescriptor {
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    pub fn is_eager(&self) -> bool {
        self.loading == Loading::Eager
    }
}

impl From<&RelationshipConfig> for RelationshipDescriptor {
    fn from(r: &RelationshipConfig) -> Self {
        RelationshipDescriptor {
            name: r.name.clone(),
            target: r.target.clone(),
            cardinality: r.cardinality,
            loading: r.loading,
            foreign_key: r.foreign_key.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Column,
    Computed,
    Relationship,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExposedField {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered field names present in every depth > 0 serialization of a type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExposedShape {
    fields: Vec<ExposedField>,
}

impl ExposedShape {
    pub fn fields(&self) -> &[ExposedField] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Derive the exposed shape of a declared type: public columns, computed attributes, eager relationships.
pub fn describe(config: &EntityConfig) -> ExposedShape {
    let columns = config
        .columns
        .iter()
        .filter(|c| !c.private)
        .map(|c| ExposedField {
            name: c.name.clone(),
            kind: FieldKind::Column,
        });
    let computed = config.computed.iter().map(|c| ExposedField {
        name: c.name.clone(),
        kind: FieldKind::Computed,
    });
    let relationships = config
        .relationships
        .iter()
        .filter(|r| r.loading == Loading::Eager)
        .map(|r| ExposedField {
            name: r.name.clone(),
            kind: FieldKind::Relationship,
        });
    ExposedShape {
        fields: columns.chain(computed).chain(relationships).collect(),
    }
}

#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub path_segment: String,
    pub columns: Vec<ColumnInfo>,
    /// Primary key column names in declared order.
    pub pk_columns: Vec<String>,
    pub relationships: Vec<RelationshipDescriptor>,
    pub computed: Vec<ComputedConfig>,
    shape: ExposedShape,
}

impl EntityDescriptor {
    /// Flatten a declaration. Call after validation; the shape is fixed from here on.
    pub fn resolve(config: &EntityConfig) -> Self {
        let columns: Vec<ColumnInfo> = config
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                type_: c.type_,
                primary_key: c.primary_key,
                private: c.private,
            })
            .collect();
        let pk_columns = columns.iter().filter(|c| c.primary_key).map(|c| c.name.clone()).collect();
        EntityDescriptor {
            name: config.name.clone(),
            path_segment: config
                .path_segment
                .clone()
                .unwrap_or_else(|| default_path_segment(&config.name)),
            columns,
            pk_columns,
            relationships: config.relationships.iter().map(RelationshipDescriptor::from).collect(),
            computed: config.computed.clone(),
            shape: describe(config),
        }
    }

    pub fn shape(&self) -> &ExposedShape {
        &self.shape
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Non-private column usable as a filter or sort key.
    pub fn public_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.column(name).filter(|c| !c.private)
    }

    pub fn public_column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().filter(|c| !c.private).map(|c| c.name.as_str())
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn pk_infos(&self) -> impl Iterator<Item = &ColumnInfo> + '_ {
        self.pk_columns.iter().filter_map(|n| self.column(n))
    }

    /// The key column when the primary key is a single column.
    pub fn single_pk(&self) -> Option<&ColumnInfo> {
        match self.pk_columns.as_slice() {
            [only] => self.column(only),
            _ => None,
        }
    }

    /// Parse raw path values (declared key order) into typed key values.
    pub fn parse_key<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<Value>, String> {
        if raw.len() != self.pk_columns.len() {
            return Err(format!(
                "{} expects {} key value(s), got {}",
                self.name,
                self.pk_columns.len(),
                raw.len()
            ));
        }
        self.pk_infos()
            .zip(raw)
            .map(|(col, v)| col.type_.parse(v.as_ref()).map_err(|e| format!("{}: {}", col.name, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, RelationshipConfig};

    fn user() -> EntityConfig {
        EntityConfig::new("User")
            .column(ColumnConfig::new("id", ScalarType::Integer).primary_key())
            .column(ColumnConfig::new("name", ScalarType::Text))
            .column(ColumnConfig::new("password_hash", ScalarType::Text).private())
            .computed("display_name", None)
            .relationship(RelationshipConfig::one("team", "Team", "team_id").eager())
            .relationship(RelationshipConfig::many("posts", "Post", "author_id"))
    }

    #[test]
    fn shape_contains_public_columns_computed_and_eager_relationships() {
        let shape = describe(&user());
        let names: Vec<&str> = shape.names().collect();
        assert_eq!(names, vec!["id", "name", "display_name", "team"]);
        assert!(!shape.contains("password_hash"));
        assert!(!shape.contains("posts"));
    }

    #[test]
    fn resolve_defaults_path_segment_and_pk_order() {
        let cfg = EntityConfig::new("OrderLine")
            .column(ColumnConfig::new("order_id", ScalarType::Integer).primary_key())
            .column(ColumnConfig::new("line_no", ScalarType::Integer).primary_key())
            .column(ColumnConfig::new("sku", ScalarType::Text));
        let d = EntityDescriptor::resolve(&cfg);
        assert_eq!(d.path_segment, "order_lines");
        assert_eq!(d.pk_columns, vec!["order_id", "line_no"]);
        assert!(d.single_pk().is_none());
    }

    #[test]
    fn parse_key_types_each_segment() {
        let d = EntityDescriptor::resolve(&user());
        assert_eq!(d.parse_key(&["7"]).unwrap(), vec![serde_json::json!(7)]);
        assert!(d.parse_key(&["seven"]).is_err());
        assert!(d.parse_key(&["1", "2"]).is_err());
    }

    #[test]
    fn private_columns_are_not_public() {
        let d = EntityDescriptor::resolve(&user());
        assert!(d.public_column("password_hash").is_none());
        assert!(d.column("password_hash").is_some());
        assert_eq!(d.public_column_names().collect::<Vec<_>>(), vec!["id", "name"]);
    }
}
