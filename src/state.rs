//! Shared state for generated routes: the built API and the store behind it.

use crate::manager::Api;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub api: Arc<Api>,
    pub store: Arc<dyn Store>,
}

impl ApiState {
    pub fn new(api: Arc<Api>, store: Arc<dyn Store>) -> Self {
        ApiState { api, store }
    }
}
