//! Entity definitions: fields, primitive types, relationships. Matches the JSON catalog format.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Integer,
    Float,
    Boolean,
    String,
    /// RFC 3339 timestamp carried as a JSON string.
    Datetime,
    Uuid,
    Json,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Integer => "integer",
            PrimitiveType::Float => "float",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::String => "string",
            PrimitiveType::Datetime => "datetime",
            PrimitiveType::Uuid => "uuid",
            PrimitiveType::Json => "json",
        }
    }

    /// Types the storage collaborator can assign on insert.
    pub fn is_generated_key(&self) -> bool {
        matches!(self, PrimitiveType::Integer | PrimitiveType::Uuid)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: PrimitiveType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: PrimitiveType) -> Self {
        FieldDefinition {
            name: name.into(),
            ty,
            nullable: false,
            primary_key: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// How a relationship is realized in storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Target rows carry `foreign_key` = owner primary key.
    OneToMany { foreign_key: String },
    /// Association table with one row per (owner, target) link.
    ManyToMany {
        association: String,
        owner_key: String,
        target_key: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    /// Path segment under the owner, e.g. `/users/1/items`.
    pub name: String,
    /// Name (not route) of the related entity.
    pub target: String,
    #[serde(flatten)]
    pub kind: RelationshipKind,
}

impl RelationshipDefinition {
    pub fn association_table(&self) -> Option<&str> {
        match &self.kind {
            RelationshipKind::OneToMany { .. } => None,
            RelationshipKind::ManyToMany { association, .. } => Some(association),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Display name used in messages, e.g. `Item`.
    pub name: String,
    /// Collection name: URL segment and storage table, e.g. `items`.
    pub route: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

impl EntityDefinition {
    pub fn builder(name: impl Into<String>, route: impl Into<String>) -> EntityBuilder {
        EntityBuilder {
            def: EntityDefinition {
                name: name.into(),
                route: route.into(),
                fields: Vec::new(),
                relationships: Vec::new(),
            },
        }
    }

    /// The primary-key field. Registry validation guarantees exactly one exists.
    pub fn primary_key(&self) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Primary-key column name, `id` if the definition has not been validated yet.
    pub fn pk_name(&self) -> &str {
        self.primary_key().map(|f| f.name.as_str()).unwrap_or("id")
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields accepted in write payloads (everything but the storage-assigned key).
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.primary_key)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Column used by `search`: first string field among `name`, `username`.
    pub fn display_column(&self) -> Option<&FieldDefinition> {
        ["name", "username"]
            .iter()
            .filter_map(|n| self.field(n))
            .find(|f| f.ty == PrimitiveType::String)
    }
}

pub struct EntityBuilder {
    def: EntityDefinition,
}

impl EntityBuilder {
    pub fn key(mut self, name: impl Into<String>, ty: PrimitiveType) -> Self {
        self.def.fields.push(FieldDefinition::new(name, ty).primary_key());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: PrimitiveType) -> Self {
        self.def.fields.push(FieldDefinition::new(name, ty));
        self
    }

    pub fn nullable_field(mut self, name: impl Into<String>, ty: PrimitiveType) -> Self {
        self.def.fields.push(FieldDefinition::new(name, ty).nullable());
        self
    }

    pub fn one_to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.def.relationships.push(RelationshipDefinition {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::OneToMany {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    pub fn many_to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        association: impl Into<String>,
        owner_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        self.def.relationships.push(RelationshipDefinition {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::ManyToMany {
                association: association.into(),
                owner_key: owner_key.into(),
                target_key: target_key.into(),
            },
        });
        self
    }

    pub fn build(self) -> EntityDefinition {
        self.def
    }
}
