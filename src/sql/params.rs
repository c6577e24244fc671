//! Convert serde_json::Value to typed values that sqlx can bind, guided by the field type.

use crate::catalog::PrimitiveType;
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// A typed, nullable bind parameter. Nulls keep their type so PostgreSQL can infer the placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    BigInt(Option<i64>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Text(Option<String>),
    Timestamp(Option<chrono::DateTime<chrono::Utc>>),
    Uuid(Option<uuid::Uuid>),
    Json(Option<Value>),
}

impl PgBindValue {
    /// `None` when the JSON value does not fit the column type.
    pub fn from_json(v: &Value, ty: PrimitiveType) -> Option<Self> {
        if v.is_null() {
            return Some(Self::null(ty));
        }
        Some(match ty {
            PrimitiveType::Integer => PgBindValue::BigInt(Some(v.as_i64()?)),
            PrimitiveType::Float => PgBindValue::Float(Some(v.as_f64()?)),
            PrimitiveType::Boolean => PgBindValue::Bool(Some(v.as_bool()?)),
            PrimitiveType::String => PgBindValue::Text(Some(v.as_str()?.to_string())),
            PrimitiveType::Datetime => {
                let parsed = chrono::DateTime::parse_from_rfc3339(v.as_str()?).ok()?;
                PgBindValue::Timestamp(Some(parsed.with_timezone(&chrono::Utc)))
            }
            PrimitiveType::Uuid => PgBindValue::Uuid(Some(uuid::Uuid::parse_str(v.as_str()?).ok()?)),
            PrimitiveType::Json => PgBindValue::Json(Some(v.clone())),
        })
    }

    pub fn null(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Integer => PgBindValue::BigInt(None),
            PrimitiveType::Float => PgBindValue::Float(None),
            PrimitiveType::Boolean => PgBindValue::Bool(None),
            PrimitiveType::String => PgBindValue::Text(None),
            PrimitiveType::Datetime => PgBindValue::Timestamp(None),
            PrimitiveType::Uuid => PgBindValue::Uuid(None),
            PrimitiveType::Json => PgBindValue::Json(None),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        PgBindValue::Text(Some(s.into()))
    }

    pub fn bind_to<'q>(self, q: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            PgBindValue::BigInt(v) => q.bind(v),
            PgBindValue::Float(v) => q.bind(v),
            PgBindValue::Bool(v) => q.bind(v),
            PgBindValue::Text(v) => q.bind(v),
            PgBindValue::Timestamp(v) => q.bind(v),
            PgBindValue::Uuid(v) => q.bind(v),
            PgBindValue::Json(v) => q.bind(v),
        }
    }
}

/// Column cast used in SELECT lists and placeholders so decoding is type-stable.
pub fn pg_cast(ty: PrimitiveType) -> &'static str {
    match ty {
        PrimitiveType::Integer => "bigint",
        PrimitiveType::Float => "float8",
        PrimitiveType::Boolean => "boolean",
        PrimitiveType::String => "text",
        PrimitiveType::Datetime => "timestamptz",
        PrimitiveType::Uuid => "uuid",
        PrimitiveType::Json => "jsonb",
    }
}
