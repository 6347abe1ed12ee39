//! Declaration validation: referential integrity and exposure consistency. Failures are startup-fatal.

use crate::case::default_path_segment;
use crate::config::{Cardinality, EntityConfig, ExposeConfig, RelationshipSelection};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Path placeholder used for relationship positions; no key column may take this name.
pub const POSITION_PARAM: &str = "position";

/// Path segment under the URL prefix serving status routes; no entity may take it.
pub const STATUS_SEGMENT: &str = "_status";

pub fn validate(entities: &[EntityConfig], exposures: &[ExposeConfig]) -> Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &EntityConfig> = HashMap::new();
    let mut path_segments = HashSet::new();
    for e in entities {
        if by_name.insert(e.name.as_str(), e).is_some() {
            return Err(ConfigError::DuplicateEntity(e.name.clone()));
        }
        let segment = e.path_segment.clone().unwrap_or_else(|| default_path_segment(&e.name));
        if segment.is_empty() || segment.contains('/') || segment == STATUS_SEGMENT {
            return Err(ConfigError::Validation(format!(
                "{}: path segment '{}' must be a single non-empty, unreserved segment",
                e.name, segment
            )));
        }
        if !path_segments.insert(segment.clone()) {
            return Err(ConfigError::DuplicatePathSegment(segment));
        }
    }

    for e in entities {
        validate_columns(e)?;
    }

    for e in entities {
        for r in &e.relationships {
            let invalid = |reason: String| ConfigError::InvalidRelationship {
                entity: e.name.clone(),
                relationship: r.name.clone(),
                reason,
            };
            if e.columns.iter().any(|c| c.name == r.name) || e.computed.iter().any(|c| c.name == r.name) {
                return Err(invalid("name collides with a column".into()));
            }
            let target = by_name
                .get(r.target.as_str())
                .ok_or_else(|| invalid(format!("target type '{}' is not registered", r.target)))?;
            // one: our fk -> target key; many: target fk -> our key
            let (key_owner, fk_owner) = match r.cardinality {
                Cardinality::One => (*target, e),
                Cardinality::Many => (e, *target),
            };
            let key_count = key_owner.columns.iter().filter(|c| c.primary_key).count();
            if key_count != 1 {
                return Err(invalid(format!(
                    "{} must have a single-column primary key to be joined",
                    key_owner.name
                )));
            }
            if !fk_owner.columns.iter().any(|c| c.name == r.foreign_key) {
                return Err(invalid(format!(
                    "foreign key column '{}' not found on {}",
                    r.foreign_key, fk_owner.name
                )));
            }
        }
    }

    let mut exposed = HashSet::new();
    for x in exposures {
        let entity = by_name.get(x.entity.as_str()).ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: x.entity.clone(),
        })?;
        if !exposed.insert(x.entity.as_str()) {
            return Err(ConfigError::Validation(format!("{} is exposed more than once", x.entity)));
        }
        if let RelationshipSelection::Only(names) = &x.relationships {
            for n in names {
                if !entity.relationships.iter().any(|r| &r.name == n) {
                    return Err(ConfigError::MissingReference {
                        kind: "relationship",
                        id: format!("{}.{}", x.entity, n),
                    });
                }
            }
        }
        for col in x.validation.keys() {
            if !entity.columns.iter().any(|c| &c.name == col) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", x.entity, col),
                });
            }
        }
    }
    Ok(())
}

fn validate_columns(e: &EntityConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for c in &e.columns {
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::Validation(format!("{}: duplicate column '{}'", e.name, c.name)));
        }
    }
    for c in &e.computed {
        if !names.insert(c.name.as_str()) {
            return Err(ConfigError::Validation(format!("{}: duplicate field '{}'", e.name, c.name)));
        }
    }
    let pk: Vec<_> = e.columns.iter().filter(|c| c.primary_key).collect();
    if pk.is_empty() {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: e.name.clone(),
            reason: "no primary key column declared".into(),
        });
    }
    for c in pk {
        if c.name == POSITION_PARAM {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                reason: format!("'{}' is reserved", POSITION_PARAM),
            });
        }
        if c.private {
            return Err(ConfigError::InvalidPrimaryKey {
                entity: e.name.clone(),
                reason: format!("key column '{}' cannot be private", c.name),
            });
        }
    }
    Ok(())
}
