//! In-process store. Tables keep insertion order, which is their natural order.

use super::{pk_type, Link, Store};
use crate::catalog::{EntityDefinition, PrimitiveType};
use crate::error::StoreError;
use crate::service::{value_eq, Page, QueryPlan, Record};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Default)]
struct Table {
    rows: Vec<Value>,
    last_id: i64,
}

#[derive(Default)]
struct Tables {
    by_route: HashMap<String, Table>,
    /// association table -> (owner id, target id) in link order
    links: HashMap<String, Vec<(Value, Value)>>,
}

/// Lock is never held across an await point.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn row_index(table: &Table, pk: &str, key: &Value) -> Option<usize> {
        table
            .rows
            .iter()
            .position(|r| r.get(pk).map(|v| value_eq(v, key)).unwrap_or(false))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_page(&self, entity: &EntityDefinition, plan: &QueryPlan) -> Result<Page, StoreError> {
        let rows = {
            let inner = self.inner.read();
            inner
                .by_route
                .get(&entity.route)
                .map(|t| t.rows.clone())
                .unwrap_or_default()
        };
        Ok(plan.apply(rows))
    }

    async fn find(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.by_route.get(&entity.route).and_then(|t| {
            Self::row_index(t, entity.pk_name(), pk).map(|i| t.rows[i].clone())
        }))
    }

    async fn select_where(
        &self,
        entity: &EntityDefinition,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_route
            .get(&entity.route)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| r.get(column).map(|v| value_eq(v, value)).unwrap_or(false))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn select_linked(
        &self,
        target: &EntityDefinition,
        link: &Link<'_>,
        owner_id: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner.read();
        let Some(pairs) = inner.links.get(link.association) else {
            return Ok(Vec::new());
        };
        let Some(table) = inner.by_route.get(&target.route) else {
            return Ok(Vec::new());
        };
        let pk = target.pk_name();
        Ok(pairs
            .iter()
            .filter(|(owner, _)| value_eq(owner, owner_id))
            .filter_map(|(_, target_id)| Self::row_index(table, pk, target_id).map(|i| table.rows[i].clone()))
            .collect())
    }

    async fn insert(&self, entity: &EntityDefinition, record: &Record) -> Result<Value, StoreError> {
        let mut inner = self.inner.write();
        let table = inner.by_route.entry(entity.route.clone()).or_default();
        let id = match pk_type(entity) {
            PrimitiveType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
            _ => {
                table.last_id += 1;
                Value::from(table.last_id)
            }
        };
        let mut row = Map::new();
        for f in &entity.fields {
            let v = if f.primary_key {
                id.clone()
            } else {
                record.get(&f.name).cloned().unwrap_or(Value::Null)
            };
            row.insert(f.name.clone(), v);
        }
        table.rows.push(Value::Object(row));
        Ok(id)
    }

    async fn update(
        &self,
        entity: &EntityDefinition,
        pk: &Value,
        changes: &Record,
    ) -> Result<Option<Value>, StoreError> {
        let mut inner = self.inner.write();
        let Some(table) = inner.by_route.get_mut(&entity.route) else {
            return Ok(None);
        };
        let Some(i) = Self::row_index(table, entity.pk_name(), pk) else {
            return Ok(None);
        };
        let row = table.rows[i]
            .as_object_mut()
            .ok_or_else(|| StoreError::Backend(format!("{} row is not an object", entity.name)))?;
        for (k, v) in changes {
            row.insert(k.clone(), v.clone());
        }
        Ok(Some(table.rows[i].clone()))
    }

    async fn delete(&self, entity: &EntityDefinition, pk: &Value) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let Some(table) = inner.by_route.get_mut(&entity.route) else {
            return Ok(false);
        };
        match Self::row_index(table, entity.pk_name(), pk) {
            Some(i) => {
                table.rows.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn link(&self, link: &Link<'_>, owner_id: &Value, target_id: &Value) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner
            .links
            .entry(link.association.to_string())
            .or_default()
            .push((owner_id.clone(), target_id.clone()));
        Ok(())
    }
}
