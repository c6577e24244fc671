//! HTTP handlers for entity CRUD, relationships and websocket sessions.

pub mod entity;
pub mod realtime;
pub mod relation;
pub use entity::*;
pub use realtime::*;
pub use relation::*;
