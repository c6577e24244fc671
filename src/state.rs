//! Shared application state for all routes.

use crate::broker::{Broker, ChangeAction, ChangeEvent};
use crate::catalog::{RegisteredEntity, Registry};
use crate::service::{CrudService, RelationService};
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn Store>,
    pub broker: Arc<Broker>,
}

impl AppState {
    pub fn new(registry: Registry, store: impl Store + 'static) -> Self {
        AppState {
            registry: Arc::new(registry),
            store: Arc::new(store),
            broker: Arc::new(Broker::new()),
        }
    }

    pub fn crud(&self) -> CrudService<'_> {
        CrudService::new(&self.registry, self.store.as_ref())
    }

    pub fn relations(&self) -> RelationService<'_> {
        RelationService::new(&self.registry, self.store.as_ref())
    }

    /// Publish a change event on the entity's route topic. Nobody listening is fine.
    pub fn notify(&self, entity: &RegisteredEntity, event: ChangeAction, id: &Value) {
        let payload = ChangeEvent {
            event,
            entity: entity.name(),
            id,
        };
        match serde_json::to_string(&payload) {
            Ok(text) => {
                let n = self.broker.broadcast(entity.route(), &text);
                tracing::debug!(topic = %entity.route(), delivered = n, "change event");
            }
            Err(e) => tracing::warn!(error = %e, "change event not serialized"),
        }
    }
}
