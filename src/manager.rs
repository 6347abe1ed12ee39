//! Registry and manager: declared entity types, their exposures, hooks and global defaults.
//! `ApiManager` collects declarations; `build` freezes them into an immutable `Api`.

use crate::config::{
    validate, ApiSettings, EntityConfig, EntityDescriptor, ExposeConfig, Method, ModelConfig,
    RelationshipDescriptor, RelationshipSelection, ValidationRule,
};
use crate::error::ConfigError;
use crate::hooks::Hooks;
use crate::routes::descriptor::{generate, RouteDescriptor};
use crate::store::AttributeSet;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Endpoint registration: allowed methods and sub-resource relationships of one type.
#[derive(Clone, Debug)]
pub struct Registration {
    pub entity: Arc<EntityDescriptor>,
    pub methods: BTreeSet<Method>,
    pub relationships: RelationshipSelection,
    pub validation: HashMap<String, ValidationRule>,
}

impl Registration {
    /// Many-relationships selected for sub-resource routes, in declared order.
    pub fn exposed_relationships(&self) -> impl Iterator<Item = &RelationshipDescriptor> + '_ {
        self.entity
            .relationships
            .iter()
            .filter(|r| r.is_many() && self.relationships.includes(&r.name))
    }
}

/// Process-wide table of entity descriptors and registrations. Read-only once built.
#[derive(Debug)]
pub struct Registry {
    settings: ApiSettings,
    entities: Vec<Arc<EntityDescriptor>>,
    by_name: HashMap<String, usize>,
    registrations: Vec<Registration>,
}

impl Registry {
    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }

    pub fn entities(&self) -> &[Arc<EntityDescriptor>] {
        &self.entities
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn registration(&self, entity: &str) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.entity.name == entity)
    }
}

/// Built API: registry, frozen route table and hooks.
#[derive(Debug)]
pub struct Api {
    registry: Arc<Registry>,
    routes: Vec<Arc<RouteDescriptor>>,
    hooks: Hooks,
}

impl Api {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &ApiSettings {
        self.registry.settings()
    }

    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn is_authorized(&self, entity: &EntityDescriptor, relationship: Option<&RelationshipDescriptor>, method: Method) -> bool {
        self.hooks.is_authorized(entity, relationship, method)
    }

    pub fn is_valid(&self, entity: &EntityDescriptor, attributes: &AttributeSet, method: Method) -> bool {
        self.hooks.is_valid(entity, attributes, method)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApiManager {
    settings: ApiSettings,
    entities: Vec<EntityConfig>,
    exposures: Vec<ExposeConfig>,
    hooks: Hooks,
}

impl ApiManager {
    pub fn new(settings: ApiSettings) -> Self {
        ApiManager {
            settings,
            ..ApiManager::default()
        }
    }

    /// Manager pre-filled from a model file. File settings win over `fallback`.
    pub fn from_model(model: ModelConfig, fallback: ApiSettings) -> Self {
        ApiManager {
            settings: model.settings.unwrap_or(fallback),
            entities: model.entities,
            exposures: model.expose,
            hooks: Hooks::default(),
        }
    }

    /// Declare an entity type (exposed or not; relationship targets must be declared).
    pub fn entity(mut self, entity: EntityConfig) -> Self {
        self.entities.push(entity);
        self
    }

    /// Register a type for endpoints. Replaces any earlier registration of the same type.
    pub fn expose(mut self, exposure: ExposeConfig) -> Self {
        self.exposures.retain(|x| x.entity != exposure.entity);
        self.exposures.push(exposure);
        self
    }

    /// Register every type declared so far with the same methods and relationship selection.
    pub fn expose_all(mut self, methods: &[Method], relationships: RelationshipSelection) -> Self {
        let names: Vec<String> = self.entities.iter().map(|e| e.name.clone()).collect();
        for name in names {
            self = self.expose(
                ExposeConfig::new(name)
                    .methods(methods.iter().copied())
                    .relationships(relationships.clone()),
            );
        }
        self
    }

    pub fn authorize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EntityDescriptor, Option<&RelationshipDescriptor>, Method) -> bool + Send + Sync + 'static,
    {
        self.hooks.authorize = Arc::new(hook);
        self
    }

    pub fn validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EntityDescriptor, &AttributeSet, Method) -> bool + Send + Sync + 'static,
    {
        self.hooks.validate = Arc::new(hook);
        self
    }

    /// Validate declarations, compute every exposed shape once and generate the route table.
    pub fn build(self) -> Result<Arc<Api>, ConfigError> {
        validate(&self.entities, &self.exposures)?;

        let entities: Vec<Arc<EntityDescriptor>> = self
            .entities
            .iter()
            .map(|e| Arc::new(EntityDescriptor::resolve(e)))
            .collect();
        let by_name = entities.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect::<HashMap<_, _>>();

        let mut registrations = Vec::with_capacity(self.exposures.len());
        for x in &self.exposures {
            let entity = by_name
                .get(&x.entity)
                .map(|&i| Arc::clone(&entities[i]))
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "entity",
                    id: x.entity.clone(),
                })?;
            registrations.push(Registration {
                entity,
                methods: x.methods.iter().copied().collect(),
                relationships: x.relationships.clone(),
                validation: x.validation.clone(),
            });
        }

        let routes: Vec<Arc<RouteDescriptor>> = registrations
            .iter()
            .flat_map(generate)
            .map(Arc::new)
            .collect();
        tracing::info!(
            entities = entities.len(),
            registrations = registrations.len(),
            routes = routes.len(),
            "generated api routes"
        );

        Ok(Arc::new(Api {
            registry: Arc::new(Registry {
                settings: self.settings,
                entities,
                by_name,
                registrations,
            }),
            routes,
            hooks: self.hooks,
        }))
    }
}
