//! Record service: schema-driven REST and real-time record backend library.

pub mod broker;
pub mod catalog;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use broker::{Broker, ChangeAction, ChangeEvent, ConnectionId, Subscriber};
pub use catalog::{load_catalog, parse_catalog, EntityDefinition, PrimitiveType, Registry};
pub use error::{AppError, RegistryError, StoreError};
pub use routes::{app, common_routes, entity_routes, realtime_routes};
pub use service::{CrudService, QueryOptions, RelationService};
pub use settings::{Settings, SettingsError};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
