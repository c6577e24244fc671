//! Generic relationship traversal and creation for one-to-many and many-to-many links.

use crate::catalog::{RegisteredEntity, Registry, RelationshipDefinition, RelationshipKind};
use crate::error::AppError;
use crate::store::{Link, Store};
use serde_json::Value;

/// Resolved (owner, relationship, target) triple for one request.
pub struct Relation<'a> {
    pub owner: &'a RegisteredEntity,
    pub relationship: &'a RelationshipDefinition,
    pub target: &'a RegisteredEntity,
}

pub struct RelationService<'a> {
    registry: &'a Registry,
    store: &'a dyn Store,
}

impl<'a> RelationService<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn Store) -> Self {
        RelationService { registry, store }
    }

    pub fn resolve(&self, route: &str, name: &str) -> Result<Relation<'a>, AppError> {
        let owner = self.registry.lookup_route(route)?;
        let relationship = owner
            .definition
            .relationship(name)
            .ok_or_else(|| AppError::UnknownRelationship {
                entity: owner.name().to_string(),
                name: name.to_string(),
            })?;
        let target = self.registry.target_of(relationship)?;
        Ok(Relation {
            owner,
            relationship,
            target,
        })
    }

    async fn require_owner(&self, rel: &Relation<'_>, owner_id: &Value) -> Result<(), AppError> {
        match self.store.find(&rel.owner.definition, owner_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found(rel.owner.name(), owner_id)),
        }
    }

    /// Related rows exactly as stored; empty when there are none.
    pub async fn list_related(&self, rel: &Relation<'_>, owner_id: &Value) -> Result<Vec<Value>, AppError> {
        self.require_owner(rel, owner_id).await?;
        let rows = match &rel.relationship.kind {
            RelationshipKind::OneToMany { foreign_key } => {
                self.store
                    .select_where(&rel.target.definition, foreign_key, owner_id)
                    .await?
            }
            RelationshipKind::ManyToMany { .. } => {
                let link = self.link_for(rel)?;
                self.store
                    .select_linked(&rel.target.definition, &link, owner_id)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Insert a target row and associate it with the owner. Returns the new row's key.
    ///
    /// One-to-many writes the owner key into the foreign-key field as part of the insert.
    /// Many-to-many inserts first and links second; a failed link leaves the new row in
    /// place and is reported as [`AppError::Association`].
    pub async fn create_related(
        &self,
        rel: &Relation<'_>,
        owner_id: &Value,
        payload: &Value,
    ) -> Result<Value, AppError> {
        self.require_owner(rel, owner_id).await?;
        match &rel.relationship.kind {
            RelationshipKind::OneToMany { foreign_key } => {
                let mut payload = payload.clone();
                if let Value::Object(map) = &mut payload {
                    map.insert(foreign_key.clone(), owner_id.clone());
                }
                let record = rel.target.create.validate(&payload)?;
                let id = self.store.insert(&rel.target.definition, &record).await?;
                tracing::info!(owner = %rel.owner.name(), owner_id = %owner_id, entity = %rel.target.name(), id = %id, "created related");
                Ok(id)
            }
            RelationshipKind::ManyToMany { .. } => {
                let link = self.link_for(rel)?;
                let record = rel.target.create.validate(payload)?;
                let id = self.store.insert(&rel.target.definition, &record).await?;
                if let Err(source) = self.store.link(&link, owner_id, &id).await {
                    tracing::warn!(association = %link.association, id = %id, error = %source, "link failed, row left orphaned");
                    return Err(AppError::Association {
                        entity: rel.target.name().to_string(),
                        id,
                        source,
                    });
                }
                tracing::info!(owner = %rel.owner.name(), owner_id = %owner_id, entity = %rel.target.name(), id = %id, "created and linked");
                Ok(id)
            }
        }
    }

    fn link_for<'r>(&self, rel: &'r Relation<'_>) -> Result<Link<'r>, AppError> {
        Link::for_relationship(rel.relationship, &rel.owner.definition, &rel.target.definition).ok_or_else(|| {
            AppError::BadRequest(format!("{} is not a many-to-many relationship", rel.relationship.name))
        })
    }
}
