//! Generic CRUD over any registered entity. Entity-specific behavior comes only from its definition.

use crate::catalog::{PrimitiveType, RegisteredEntity, Registry};
use crate::error::AppError;
use crate::service::{plan, Page, QueryOptions};
use crate::store::{pk_type, Store};
use serde_json::Value;

pub struct CrudService<'a> {
    registry: &'a Registry,
    store: &'a dyn Store,
}

impl<'a> CrudService<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn Store) -> Self {
        CrudService { registry, store }
    }

    pub fn entity(&self, route: &str) -> Result<&'a RegisteredEntity, AppError> {
        Ok(self.registry.lookup_route(route)?)
    }

    /// Parse a path key according to the entity's primary-key type.
    pub fn parse_key(entity: &RegisteredEntity, raw: &str) -> Result<Value, AppError> {
        let def = &entity.definition;
        let bad = || AppError::BadRequest(format!("invalid id '{}' for {}", raw, def.name));
        Ok(match pk_type(def) {
            PrimitiveType::Uuid => {
                let u = uuid::Uuid::parse_str(raw.trim()).map_err(|_| bad())?;
                Value::String(u.to_string())
            }
            _ => {
                let n: i64 = raw.trim().parse().map_err(|_| bad())?;
                Value::from(n)
            }
        })
    }

    pub async fn list(&self, route: &str, opts: &QueryOptions) -> Result<Page, AppError> {
        let entity = self.entity(route)?;
        let plan = plan(&entity.definition, opts)?;
        Ok(self.store.fetch_page(&entity.definition, &plan).await?)
    }

    pub async fn get_one(&self, route: &str, pk: &Value) -> Result<Value, AppError> {
        let entity = self.entity(route)?;
        self.store
            .find(&entity.definition, pk)
            .await?
            .ok_or_else(|| AppError::not_found(entity.name(), pk))
    }

    /// Validate against the create contract and insert. Returns the assigned key.
    pub async fn create(&self, route: &str, payload: &Value) -> Result<Value, AppError> {
        let entity = self.entity(route)?;
        let record = entity.create.validate(payload)?;
        let id = self.store.insert(&entity.definition, &record).await?;
        tracing::info!(entity = %entity.name(), id = %id, "created");
        Ok(id)
    }

    /// Apply only the fields present in `payload`. Returns the post-update row.
    pub async fn update(&self, route: &str, pk: &Value, payload: &Value) -> Result<Value, AppError> {
        let entity = self.entity(route)?;
        // Existence first so a missing row is 404 even when the payload is also invalid.
        if self.store.find(&entity.definition, pk).await?.is_none() {
            return Err(AppError::not_found(entity.name(), pk));
        }
        let changes = entity.update.validate(payload)?;
        let row = self
            .store
            .update(&entity.definition, pk, &changes)
            .await?
            .ok_or_else(|| AppError::not_found(entity.name(), pk))?;
        tracing::info!(entity = %entity.name(), id = %pk, fields = changes.len(), "updated");
        Ok(row)
    }

    /// Remove the row; related rows are left to the store's own constraints.
    pub async fn delete(&self, route: &str, pk: &Value) -> Result<Value, AppError> {
        let entity = self.entity(route)?;
        if !self.store.delete(&entity.definition, pk).await? {
            return Err(AppError::not_found(entity.name(), pk));
        }
        tracing::info!(entity = %entity.name(), id = %pk, "deleted");
        Ok(pk.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityDefinition;
    use crate::error::RegistryError;
    use crate::service::SortDirection;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::from_definitions([EntityDefinition::builder("Item", "items")
            .key("id", PrimitiveType::Integer)
            .field("name", PrimitiveType::String)
            .field("price", PrimitiveType::Float)
            .nullable_field("note", PrimitiveType::String)
            .build()])
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_returns_payload() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        let id = crud
            .create("items", &json!({"name": "pen", "price": 5, "note": null}))
            .await
            .unwrap();
        assert_eq!(id, json!(1));
        let row = crud.get_one("items", &id).await.unwrap();
        assert_eq!(row, json!({"id": 1, "name": "pen", "price": 5, "note": null}));
    }

    #[tokio::test]
    async fn partial_update_changes_only_given_field() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        let id = crud
            .create("items", &json!({"name": "pen", "price": 5, "note": "blue"}))
            .await
            .unwrap();
        let row = crud.update("items", &id, &json!({"price": 7})).await.unwrap();
        assert_eq!(row, json!({"id": 1, "name": "pen", "price": 7, "note": "blue"}));
        let row = crud.update("items", &id, &json!({"note": null})).await.unwrap();
        assert_eq!(row["note"], Value::Null);
        assert_eq!(row["price"], json!(7));
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found_before_validation() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        let err = crud.update("items", &json!(42), &json!({"bogus": 1})).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        let id = crud
            .create("items", &json!({"name": "pen", "price": 5, "note": null}))
            .await
            .unwrap();
        assert_eq!(crud.delete("items", &id).await.unwrap(), id);
        let err = crud.delete("items", &id).await.unwrap_err();
        assert_eq!(err.to_string(), "Item with id 1 not found");
        assert!(matches!(crud.get_one("items", &id).await, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn invalid_create_reports_every_violation() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        match crud.create("items", &json!({"price": "free"})).await {
            Err(AppError::Validation(v)) => assert_eq!(v.len(), 3),
            other => panic!("expected validation error, got {:?}", other),
        }
        let page = crud.list("items", &QueryOptions::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn list_sorts_descending() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        for (n, p) in [("pen", 5), ("book", 10)] {
            crud.create("items", &json!({"name": n, "price": p, "note": null}))
                .await
                .unwrap();
        }
        let opts = QueryOptions {
            sort_column: Some("price".into()),
            sort_direction: SortDirection::Desc,
            ..Default::default()
        };
        let page = crud.list("items", &opts).await.unwrap();
        assert_eq!(page.rows[0]["price"], json!(10));
    }

    #[tokio::test]
    async fn unknown_route_is_unknown_entity() {
        let reg = registry();
        let store = MemoryStore::new();
        let crud = CrudService::new(&reg, &store);
        let err = crud.get_one("widgets", &json!(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Registry(RegistryError::UnknownEntity(_))));
    }

    #[test]
    fn parse_key_follows_pk_type() {
        let reg = registry();
        let e = reg.lookup_route("items").unwrap();
        assert_eq!(CrudService::parse_key(e, "12").unwrap(), json!(12));
        assert!(matches!(CrudService::parse_key(e, "twelve"), Err(AppError::BadRequest(_))));
    }
}
