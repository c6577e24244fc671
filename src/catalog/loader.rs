//! Load the entity catalog from JSON (file or string) into a built registry.

use crate::catalog::{EntityDefinition, Registry};
use crate::error::RegistryError;
use serde::Deserialize;
use std::path::Path;

/// On-disk catalog: `{ "entities": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub entities: Vec<EntityDefinition>,
}

pub fn parse_catalog(json: &str) -> Result<Registry, RegistryError> {
    let file: CatalogFile = serde_json::from_str(json).map_err(|e| RegistryError::Load(e.to_string()))?;
    Registry::from_definitions(file.entities)
}

pub async fn load_catalog(path: impl AsRef<Path>) -> Result<Registry, RegistryError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RegistryError::Load(format!("{}: {}", path.display(), e)))?;
    let registry = parse_catalog(&raw)?;
    tracing::info!(path = %path.display(), entities = registry.len(), "catalog loaded");
    Ok(registry)
}
