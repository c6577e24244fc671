//! PostgreSQL store over a sqlx pool. Tables are expected to exist; no DDL is issued here.

use super::{pk_type, Link, Store};
use crate::catalog::{EntityDefinition, PrimitiveType};
use crate::error::StoreError;
use crate::service::{Page, QueryPlan, Record};
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: Option<String>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool, schema: None }
    }

    /// Qualify every table with `schema` instead of relying on `search_path`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    async fn fetch_all(&self, q: QueryBuf) -> Result<Vec<PgRow>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.params {
            query = p.bind_to(query);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn fetch_optional(&self, q: QueryBuf) -> Result<Option<PgRow>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in q.params {
            query = p.bind_to(query);
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn execute(&self, q: QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in q.params {
            query = p.bind_to(query);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_page(&self, entity: &EntityDefinition, plan: &QueryPlan) -> Result<Page, StoreError> {
        // Two statements, no shared snapshot.
        let count_row = self
            .fetch_optional(sql::count_matching(entity, plan, self.schema()))
            .await?
            .ok_or_else(|| StoreError::Backend("COUNT returned no row".into()))?;
        let total: i64 = count_row.try_get(0)?;
        let rows = self.fetch_all(sql::select_page(entity, plan, self.schema())).await?;
        Ok(Page {
            rows: rows.iter().map(|r| row_to_json(entity, r)).collect(),
            total: total.max(0) as u64,
            skip: plan.skip,
            limit: plan.limit,
        })
    }

    async fn find(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, StoreError> {
        let row = self.fetch_optional(sql::select_by_id(entity, pk, self.schema())).await?;
        Ok(row.map(|r| row_to_json(entity, &r)))
    }

    async fn select_where(
        &self,
        entity: &EntityDefinition,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = self.fetch_all(sql::select_where(entity, column, value, self.schema())).await?;
        Ok(rows.iter().map(|r| row_to_json(entity, r)).collect())
    }

    async fn select_linked(
        &self,
        target: &EntityDefinition,
        link: &Link<'_>,
        owner_id: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = self
            .fetch_all(sql::select_linked(target, link, owner_id, self.schema()))
            .await?;
        Ok(rows.iter().map(|r| row_to_json(target, r)).collect())
    }

    async fn insert(&self, entity: &EntityDefinition, record: &Record) -> Result<Value, StoreError> {
        let row = self
            .fetch_optional(sql::insert(entity, record, self.schema()))
            .await?
            .ok_or_else(|| StoreError::Backend(format!("INSERT into {} returned no key", entity.route)))?;
        Ok(cell_to_value(&row, entity.pk_name(), pk_type(entity)))
    }

    async fn update(
        &self,
        entity: &EntityDefinition,
        pk: &Value,
        changes: &Record,
    ) -> Result<Option<Value>, StoreError> {
        let row = self.fetch_optional(sql::update(entity, pk, changes, self.schema())).await?;
        Ok(row.map(|r| row_to_json(entity, &r)))
    }

    async fn delete(&self, entity: &EntityDefinition, pk: &Value) -> Result<bool, StoreError> {
        let row = self.fetch_optional(sql::delete(entity, pk, self.schema())).await?;
        Ok(row.is_some())
    }

    async fn link(&self, link: &Link<'_>, owner_id: &Value, target_id: &Value) -> Result<(), StoreError> {
        let n = self
            .execute(sql::insert_link(link, owner_id, target_id, self.schema()))
            .await?;
        if n == 0 {
            return Err(StoreError::Backend(format!("no row inserted into {}", link.association)));
        }
        Ok(())
    }
}

fn row_to_json(entity: &EntityDefinition, row: &PgRow) -> Value {
    let mut map = Map::new();
    for f in &entity.fields {
        map.insert(f.name.clone(), cell_to_value(row, &f.name, f.ty));
    }
    Value::Object(map)
}

/// Columns are selected with a cast per field type, so one decode per type suffices.
fn cell_to_value(row: &PgRow, name: &str, ty: PrimitiveType) -> Value {
    let decoded = match ty {
        PrimitiveType::Integer => row.try_get::<Option<i64>, _>(name).map(|v| v.map(Value::from)),
        PrimitiveType::Float => row.try_get::<Option<f64>, _>(name).map(|v| v.map(float_to_value)),
        PrimitiveType::Boolean => row.try_get::<Option<bool>, _>(name).map(|v| v.map(Value::Bool)),
        PrimitiveType::String => row.try_get::<Option<String>, _>(name).map(|v| v.map(Value::String)),
        PrimitiveType::Datetime => row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .map(|v| v.map(datetime_to_value)),
        PrimitiveType::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(|u| Value::String(u.to_string()))),
        PrimitiveType::Json => row.try_get::<Option<Value>, _>(name),
    };
    match decoded {
        Ok(v) => v.unwrap_or(Value::Null),
        Err(e) => {
            tracing::warn!(column = %name, error = %e, "column decode failed");
            Value::Null
        }
    }
}

/// Whole floats come back as integers so `{"price": 5}` reads back as written.
fn float_to_value(f: f64) -> Value {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Value::from(f as i64);
    }
    serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// UTC with `Z` and only as many fractional digits as stored.
fn datetime_to_value(d: DateTime<Utc>) -> Value {
    Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
