//! Route descriptors derived from registrations. Generated once when the API is built.

use crate::config::{EntityDescriptor, Method, RelationshipDescriptor, POSITION_PARAM};
use crate::manager::Registration;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    /// Zero or many entities: listing and creation.
    Collection,
    /// Exactly one entity, optionally by 1-based position within a relationship.
    Singleton,
}

#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub kind: ViewKind,
    /// Path template relative to the URL prefix, with `:name` placeholders.
    pub path: String,
    pub methods: BTreeSet<Method>,
    pub entity: Arc<EntityDescriptor>,
    pub relationship: Option<RelationshipDescriptor>,
    /// Stable route name, e.g. `widgets_parts_collection_view`.
    pub endpoint: String,
}

impl RouteDescriptor {
    pub fn allows(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Entity type returned by this route: the relationship target, or the owning type.
    pub fn target_name(&self) -> &str {
        match &self.relationship {
            Some(rel) => &rel.target,
            None => &self.entity.name,
        }
    }

    /// Whether the route addresses the owning entity by key.
    pub fn has_key(&self) -> bool {
        self.kind == ViewKind::Singleton || self.relationship.is_some()
    }

    pub fn has_position(&self) -> bool {
        self.kind == ViewKind::Singleton && self.relationship.is_some()
    }

    /// "GET, POST" style method list.
    pub fn method_list(&self) -> String {
        self.methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ")
    }
}

fn key_segments(entity: &EntityDescriptor) -> String {
    entity.pk_columns.iter().map(|c| format!("/:{}", c)).collect()
}

fn intersect(methods: &BTreeSet<Method>, allowed: &[Method]) -> BTreeSet<Method> {
    allowed.iter().copied().filter(|m| methods.contains(m)).collect()
}

/// Routes for one registration: singleton, collection, then GET-only views per exposed many-relationship.
pub fn generate(registration: &Registration) -> Vec<RouteDescriptor> {
    let entity = &registration.entity;
    let base = format!("/{}", entity.path_segment);
    let keyed = format!("{}{}", base, key_segments(entity));
    let mut routes = Vec::new();

    let singleton_methods = intersect(&registration.methods, &[Method::Get, Method::Put, Method::Delete]);
    if !singleton_methods.is_empty() {
        routes.push(RouteDescriptor {
            kind: ViewKind::Singleton,
            path: keyed.clone(),
            methods: singleton_methods,
            entity: Arc::clone(entity),
            relationship: None,
            endpoint: format!("{}_model_view", entity.path_segment),
        });
    }

    let collection_methods = intersect(&registration.methods, &[Method::Get, Method::Post]);
    if !collection_methods.is_empty() {
        routes.push(RouteDescriptor {
            kind: ViewKind::Collection,
            path: base.clone(),
            methods: collection_methods,
            entity: Arc::clone(entity),
            relationship: None,
            endpoint: format!("{}_collection_view", entity.path_segment),
        });
    }

    // writes through a sub-resource are never generated
    let relationship_methods = intersect(&registration.methods, &[Method::Get]);
    if relationship_methods.is_empty() {
        return routes;
    }
    for rel in registration.exposed_relationships() {
        let collection_path = format!("{}/{}", keyed, rel.name);
        routes.push(RouteDescriptor {
            kind: ViewKind::Singleton,
            path: format!("{}/:{}", collection_path, POSITION_PARAM),
            methods: relationship_methods.clone(),
            entity: Arc::clone(entity),
            relationship: Some(rel.clone()),
            endpoint: format!("{}_{}_model_view", entity.path_segment, rel.name),
        });
        routes.push(RouteDescriptor {
            kind: ViewKind::Collection,
            path: collection_path,
            methods: relationship_methods.clone(),
            entity: Arc::clone(entity),
            relationship: Some(rel.clone()),
            endpoint: format!("{}_{}_collection_view", entity.path_segment, rel.name),
        });
    }
    routes
}
