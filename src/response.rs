//! Write acknowledgements: `{"message": "<Name> <action>", "id": <pk>}`.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    pub message: String,
    pub id: Value,
}

fn acknowledged(status: StatusCode, name: &str, action: &str, id: Value) -> (StatusCode, Json<Acknowledged>) {
    (
        status,
        Json(Acknowledged {
            message: format!("{} {}", name, action),
            id,
        }),
    )
}

pub fn created(name: &str, id: Value) -> (StatusCode, Json<Acknowledged>) {
    acknowledged(StatusCode::CREATED, name, "created", id)
}

pub fn updated(name: &str, id: Value) -> (StatusCode, Json<Acknowledged>) {
    acknowledged(StatusCode::OK, name, "updated", id)
}

pub fn deleted(name: &str, id: Value) -> (StatusCode, Json<Acknowledged>) {
    acknowledged(StatusCode::OK, name, "deleted", id)
}
