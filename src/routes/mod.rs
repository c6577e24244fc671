//! Router assembly.

mod common;
mod entity;
mod realtime;

pub use common::common_routes;
pub use entity::entity_routes;
pub use realtime::realtime_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Full application router. Static routes (`/health`, `/version`, `/ws/...`) take priority over
/// the entity routes; the registry refuses entity routes that would shadow them.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes())
        .merge(realtime_routes())
        .merge(entity_routes())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
