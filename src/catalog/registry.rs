//! Entity registry: definitions validated once at startup, contracts derived, then read-only.

use crate::catalog::{validate_catalog, validate_entity, EntityDefinition, RelationshipDefinition};
use crate::error::RegistryError;
use crate::service::{derive_create_contract, derive_update_contract, CreateContract, UpdateContract};
use std::collections::HashMap;

/// An entity plus its derived contracts.
#[derive(Clone, Debug)]
pub struct RegisteredEntity {
    pub definition: EntityDefinition,
    pub create: CreateContract,
    pub update: UpdateContract,
}

impl RegisteredEntity {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn route(&self) -> &str {
        &self.definition.route
    }
}

/// Collects definitions; `build` closes the catalog.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    pub fn register(&mut self, def: EntityDefinition) -> Result<&mut Self, RegistryError> {
        validate_entity(&def)?;
        if self.entities.iter().any(|e| e.name == def.name) {
            return Err(RegistryError::DuplicateEntity(def.name));
        }
        if self.entities.iter().any(|e| e.route == def.route) {
            return Err(RegistryError::DuplicateRoute(def.route));
        }
        tracing::debug!(entity = %def.name, route = %def.route, "registered entity");
        self.entities.push(def);
        Ok(self)
    }

    pub fn build(self) -> Result<Registry, RegistryError> {
        validate_catalog(&self.entities)?;
        let mut entities = Vec::with_capacity(self.entities.len());
        let mut by_name = HashMap::new();
        let mut by_route = HashMap::new();
        for (i, definition) in self.entities.into_iter().enumerate() {
            by_name.insert(definition.name.clone(), i);
            by_route.insert(definition.route.clone(), i);
            entities.push(RegisteredEntity {
                create: derive_create_contract(&definition),
                update: derive_update_contract(&definition),
                definition,
            });
        }
        Ok(Registry {
            entities,
            by_name,
            by_route,
        })
    }
}

/// Closed catalog. Shared behind `Arc`; no interior mutability.
#[derive(Debug)]
pub struct Registry {
    entities: Vec<RegisteredEntity>,
    by_name: HashMap<String, usize>,
    by_route: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registers all definitions and builds in one step.
    pub fn from_definitions(defs: impl IntoIterator<Item = EntityDefinition>) -> Result<Self, RegistryError> {
        let mut b = RegistryBuilder::new();
        for d in defs {
            b.register(d)?;
        }
        b.build()
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredEntity, RegistryError> {
        self.by_name
            .get(name)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| RegistryError::UnknownEntity(name.to_string()))
    }

    pub fn lookup_route(&self, route: &str) -> Result<&RegisteredEntity, RegistryError> {
        self.by_route
            .get(route)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| RegistryError::UnknownEntity(route.to_string()))
    }

    /// Target entity of a relationship. Always present once built.
    pub fn target_of(&self, rel: &RelationshipDefinition) -> Result<&RegisteredEntity, RegistryError> {
        self.lookup(&rel.target)
    }

    pub fn all(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PrimitiveType;

    fn item() -> EntityDefinition {
        EntityDefinition::builder("Item", "items")
            .key("id", PrimitiveType::Integer)
            .field("name", PrimitiveType::String)
            .field("price", PrimitiveType::Float)
            .build()
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut b = Registry::builder();
        b.register(item()).unwrap();
        let err = b.register(item()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateEntity(n) if n == "Item"));
    }

    #[test]
    fn register_rejects_duplicate_route() {
        let mut b = Registry::builder();
        b.register(item()).unwrap();
        let other = EntityDefinition::builder("Thing", "items")
            .key("id", PrimitiveType::Integer)
            .build();
        assert!(matches!(b.register(other), Err(RegistryError::DuplicateRoute(_))));
    }

    #[test]
    fn lookup_by_name_and_route() {
        let reg = Registry::from_definitions([item()]).unwrap();
        assert_eq!(reg.lookup("Item").unwrap().route(), "items");
        assert_eq!(reg.lookup_route("items").unwrap().name(), "Item");
        assert!(matches!(reg.lookup("Nope"), Err(RegistryError::UnknownEntity(_))));
        assert!(matches!(reg.lookup_route("nope"), Err(RegistryError::UnknownEntity(_))));
    }

    #[test]
    fn all_preserves_registration_order_and_derives_contracts() {
        let tag = EntityDefinition::builder("Tag", "tags")
            .key("id", PrimitiveType::Uuid)
            .field("label", PrimitiveType::String)
            .build();
        let reg = Registry::from_definitions([item(), tag]).unwrap();
        let names: Vec<_> = reg.all().map(|e| e.name()).collect();
        assert_eq!(names, ["Item", "Tag"]);
        assert_eq!(reg.lookup("Item").unwrap().create.slots().len(), 2);
    }

    #[test]
    fn relationships_may_reference_later_registrations() {
        let user = EntityDefinition::builder("User", "users")
            .key("id", PrimitiveType::Integer)
            .field("username", PrimitiveType::String)
            .one_to_many("items", "Item", "owner_id")
            .build();
        let item = EntityDefinition::builder("Item", "items")
            .key("id", PrimitiveType::Integer)
            .field("name", PrimitiveType::String)
            .field("owner_id", PrimitiveType::Integer)
            .build();
        let reg = Registry::from_definitions([user, item]).unwrap();
        let rel = reg.lookup("User").unwrap().definition.relationship("items").unwrap();
        assert_eq!(reg.target_of(rel).unwrap().name(), "Item");
    }
}
