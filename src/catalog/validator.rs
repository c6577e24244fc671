//! Catalog validation: structural checks per entity and referential integrity across entities.

use crate::catalog::{EntityDefinition, RelationshipKind};
use crate::error::RegistryError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Top-level routes owned by the service itself.
pub const RESERVED_ROUTES: &[&str] = &["health", "version", "ws"];

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static identifier pattern"))
}

/// Names end up as quoted SQL identifiers and URL segments; keep them plain.
pub fn is_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

fn invalid(entity: &EntityDefinition, reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidDefinition {
        entity: entity.name.clone(),
        reason: reason.into(),
    }
}

/// Checks one definition in isolation. Relationship targets are checked by [`validate_catalog`].
pub fn validate_entity(def: &EntityDefinition) -> Result<(), RegistryError> {
    if !is_identifier(&def.name) {
        return Err(invalid(def, "name must be a plain identifier"));
    }
    if !is_identifier(&def.route) {
        return Err(invalid(def, format!("route '{}' must be a plain identifier", def.route)));
    }
    if RESERVED_ROUTES.contains(&def.route.as_str()) {
        return Err(invalid(def, format!("route '{}' is reserved", def.route)));
    }

    let mut names = HashSet::new();
    for f in &def.fields {
        if !is_identifier(&f.name) {
            return Err(invalid(def, format!("field '{}' must be a plain identifier", f.name)));
        }
        if !names.insert(f.name.as_str()) {
            return Err(invalid(def, format!("duplicate field '{}'", f.name)));
        }
    }

    let keys: Vec<_> = def.fields.iter().filter(|f| f.primary_key).collect();
    match keys.as_slice() {
        [] => return Err(invalid(def, "no primary key field")),
        [pk] => {
            if !pk.ty.is_generated_key() {
                return Err(invalid(
                    def,
                    format!("primary key '{}' must be integer or uuid, got {}", pk.name, pk.ty.as_str()),
                ));
            }
            if pk.nullable {
                return Err(invalid(def, format!("primary key '{}' cannot be nullable", pk.name)));
            }
        }
        _ => return Err(invalid(def, "more than one primary key field")),
    }

    let mut rel_names = HashSet::new();
    for r in &def.relationships {
        if !is_identifier(&r.name) {
            return Err(invalid(def, format!("relationship '{}' must be a plain identifier", r.name)));
        }
        if !rel_names.insert(r.name.as_str()) {
            return Err(invalid(def, format!("duplicate relationship '{}'", r.name)));
        }
        if let RelationshipKind::ManyToMany {
            association,
            owner_key,
            target_key,
        } = &r.kind
        {
            for ident in [association, owner_key, target_key] {
                if !is_identifier(ident) {
                    return Err(invalid(
                        def,
                        format!("relationship '{}': '{}' must be a plain identifier", r.name, ident),
                    ));
                }
            }
            if owner_key == target_key {
                return Err(invalid(
                    def,
                    format!("relationship '{}': owner_key and target_key must differ", r.name),
                ));
            }
        }
    }
    Ok(())
}

/// Cross-entity checks: every relationship target exists and one-to-many foreign keys live on the target.
pub fn validate_catalog(entities: &[EntityDefinition]) -> Result<(), RegistryError> {
    let by_name: HashMap<&str, &EntityDefinition> = entities.iter().map(|e| (e.name.as_str(), e)).collect();
    for owner in entities {
        for r in &owner.relationships {
            let target = by_name.get(r.target.as_str()).ok_or_else(|| {
                invalid(owner, format!("relationship '{}' targets unknown entity '{}'", r.name, r.target))
            })?;
            if let RelationshipKind::OneToMany { foreign_key } = &r.kind {
                let fk = target.field(foreign_key).ok_or_else(|| {
                    invalid(
                        owner,
                        format!("relationship '{}': {} has no field '{}'", r.name, target.name, foreign_key),
                    )
                })?;
                if fk.primary_key {
                    return Err(invalid(
                        owner,
                        format!("relationship '{}': foreign key '{}' is the target's primary key", r.name, foreign_key),
                    ));
                }
                if let Some(pk) = owner.primary_key() {
                    if fk.ty != pk.ty {
                        return Err(invalid(
                            owner,
                            format!(
                                "relationship '{}': foreign key {}.{} is {} but {}.{} is {}",
                                r.name,
                                target.name,
                                foreign_key,
                                fk.ty.as_str(),
                                owner.name,
                                pk.name,
                                pk.ty.as_str()
                            ),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}
