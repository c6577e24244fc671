use crate::handlers::realtime::subscribe;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn realtime_routes() -> Router<AppState> {
    Router::new().route("/ws/:channel", get(subscribe))
}
