//! Relationship handlers: GET/POST /<route>/<id>/<relationship>.

use super::entity::json_body;
use crate::broker::ChangeAction;
use crate::error::AppError;
use crate::response;
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

pub async fn list_related(
    State(state): State<AppState>,
    Path((route, id_str, name)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let relations = state.relations();
    let rel = relations.resolve(&route, &name)?;
    let owner_id = CrudService::parse_key(rel.owner, &id_str)?;
    let rows = relations.list_related(&rel, &owner_id).await?;
    Ok(Json(rows))
}

pub async fn create_related(
    State(state): State<AppState>,
    Path((route, id_str, name)): Path<(String, String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let relations = state.relations();
    let rel = relations.resolve(&route, &name)?;
    let owner_id = CrudService::parse_key(rel.owner, &id_str)?;
    let id = relations.create_related(&rel, &owner_id, &body).await?;
    state.notify(rel.target, ChangeAction::Created, &id);
    Ok(response::created(rel.target.name(), id))
}
