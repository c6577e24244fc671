//! Entity CRUD and relationship routes.
//! Paths are parameterized; handlers resolve the entity from the route segment through the registry.

use crate::handlers::entity::{create, delete as delete_handler, list, read, update};
use crate::handlers::relation::{create_related, list_related};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route("/:route", get(list).post(create))
        .route("/:route/:id", get(read).put(update).delete(delete_handler))
        .route("/:route/:id/:relationship", get(list_related).post(create_related))
}
