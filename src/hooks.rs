//! Pluggable request hooks. Unset hooks are explicit always-true defaults.

use crate::config::{EntityDescriptor, Method, RelationshipDescriptor};
use crate::store::AttributeSet;
use std::fmt;
use std::sync::Arc;

/// Called before anything else on every request: `(entity, relationship, method) -> allowed`.
pub type AuthorizeFn = dyn Fn(&EntityDescriptor, Option<&RelationshipDescriptor>, Method) -> bool + Send + Sync;

/// Called on POST and PUT with the proposed attributes: `(entity, attributes, method) -> valid`.
pub type ValidateFn = dyn Fn(&EntityDescriptor, &AttributeSet, Method) -> bool + Send + Sync;

#[derive(Clone)]
pub struct Hooks {
    pub authorize: Arc<AuthorizeFn>,
    pub validate: Arc<ValidateFn>,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            authorize: Arc::new(|_: &EntityDescriptor, _: Option<&RelationshipDescriptor>, _: Method| true),
            validate: Arc::new(|_: &EntityDescriptor, _: &AttributeSet, _: Method| true),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

impl Hooks {
    pub fn is_authorized(&self, entity: &EntityDescriptor, relationship: Option<&RelationshipDescriptor>, method: Method) -> bool {
        (self.authorize)(entity, relationship, method)
    }

    pub fn is_valid(&self, entity: &EntityDescriptor, attributes: &AttributeSet, method: Method) -> bool {
        (self.validate)(entity, attributes, method)
    }
}
