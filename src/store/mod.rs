//! Storage collaborator: the core issues these requests and receives rows as JSON objects.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::catalog::{EntityDefinition, PrimitiveType, RelationshipDefinition, RelationshipKind};
use crate::error::StoreError;
use crate::service::{Page, QueryPlan, Record};
use async_trait::async_trait;
use serde_json::Value;

/// A many-to-many association table as seen by storage.
#[derive(Clone, Copy, Debug)]
pub struct Link<'a> {
    pub association: &'a str,
    pub owner_key: &'a str,
    pub target_key: &'a str,
    pub owner_type: PrimitiveType,
    pub target_type: PrimitiveType,
}

impl<'a> Link<'a> {
    /// `None` for one-to-many relationships.
    pub fn for_relationship(
        rel: &'a RelationshipDefinition,
        owner: &EntityDefinition,
        target: &EntityDefinition,
    ) -> Option<Self> {
        match &rel.kind {
            RelationshipKind::OneToMany { .. } => None,
            RelationshipKind::ManyToMany {
                association,
                owner_key,
                target_key,
            } => Some(Link {
                association: association.as_str(),
                owner_key: owner_key.as_str(),
                target_key: target_key.as_str(),
                owner_type: pk_type(owner),
                target_type: pk_type(target),
            }),
        }
    }
}

pub(crate) fn pk_type(entity: &EntityDefinition) -> PrimitiveType {
    entity
        .primary_key()
        .map(|f| f.ty)
        .unwrap_or(PrimitiveType::Integer)
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Execute a plan: matching count plus the requested window.
    async fn fetch_page(&self, entity: &EntityDefinition, plan: &QueryPlan) -> Result<Page, StoreError>;

    async fn find(&self, entity: &EntityDefinition, pk: &Value) -> Result<Option<Value>, StoreError>;

    /// Rows whose `column` equals `value`, in natural order.
    async fn select_where(
        &self,
        entity: &EntityDefinition,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError>;

    /// Target rows associated with `owner_id` through `link`.
    async fn select_linked(
        &self,
        target: &EntityDefinition,
        link: &Link<'_>,
        owner_id: &Value,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert a validated record; returns the assigned primary key.
    async fn insert(&self, entity: &EntityDefinition, record: &Record) -> Result<Value, StoreError>;

    /// Apply `changes` to the row; `None` if it does not exist.
    async fn update(
        &self,
        entity: &EntityDefinition,
        pk: &Value,
        changes: &Record,
    ) -> Result<Option<Value>, StoreError>;

    /// `false` if there was no such row.
    async fn delete(&self, entity: &EntityDefinition, pk: &Value) -> Result<bool, StoreError>;

    async fn link(&self, link: &Link<'_>, owner_id: &Value, target_id: &Value) -> Result<(), StoreError>;
}
