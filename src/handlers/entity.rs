//! Entity CRUD handlers: list, read, create, update, delete.

use crate::broker::ChangeAction;
use crate::error::AppError;
use crate::response;
use crate::service::{CrudService, QueryOptions};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

/// Malformed or non-JSON bodies get the same error envelope as everything else.
pub(crate) fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

pub async fn list(
    State(state): State<AppState>,
    Path(route): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let opts = QueryOptions::from_params(&params)?;
    let page = state.crud().list(&route, &opts).await?;
    Ok(Json(page))
}

pub async fn read(
    State(state): State<AppState>,
    Path((route, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let crud = state.crud();
    let entity = crud.entity(&route)?;
    let id = CrudService::parse_key(entity, &id_str)?;
    let row = crud.get_one(&route, &id).await?;
    Ok(Json(row))
}

pub async fn create(
    State(state): State<AppState>,
    Path(route): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let crud = state.crud();
    let entity = crud.entity(&route)?;
    let id = crud.create(&route, &body).await?;
    state.notify(entity, ChangeAction::Created, &id);
    Ok(response::created(entity.name(), id))
}

pub async fn update(
    State(state): State<AppState>,
    Path((route, id_str)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(body)?;
    let crud = state.crud();
    let entity = crud.entity(&route)?;
    let id = CrudService::parse_key(entity, &id_str)?;
    crud.update(&route, &id, &body).await?;
    state.notify(entity, ChangeAction::Updated, &id);
    Ok(response::updated(entity.name(), id))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((route, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let crud = state.crud();
    let entity = crud.entity(&route)?;
    let id = CrudService::parse_key(entity, &id_str)?;
    let id = crud.delete(&route, &id).await?;
    state.notify(entity, ChangeAction::Deleted, &id);
    Ok(response::deleted(entity.name(), id))
}
