//! Create/update contracts derived from entity fields. Validation reports every violation at once.

use crate::catalog::{EntityDefinition, FieldDefinition, PrimitiveType};
use crate::error::{AppError, FieldViolation};
use serde_json::{Map, Value};

/// A validated write payload: field name -> value.
pub type Record = Map<String, Value>;

/// One typed slot in a contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: PrimitiveType,
    pub nullable: bool,
}

impl From<&FieldDefinition> for Slot {
    fn from(f: &FieldDefinition) -> Self {
        Slot {
            name: f.name.clone(),
            ty: f.ty,
            nullable: f.nullable,
        }
    }
}

/// Every slot must be present.
#[derive(Clone, Debug)]
pub struct CreateContract {
    entity: String,
    pk: String,
    slots: Vec<Slot>,
}

/// Every slot optional; absent means unchanged, explicit null means clear.
#[derive(Clone, Debug)]
pub struct UpdateContract {
    entity: String,
    pk: String,
    slots: Vec<Slot>,
}

/// Collects slots from an entity definition and emits both contracts.
pub struct ContractBuilder {
    entity: String,
    pk: String,
    slots: Vec<Slot>,
}

impl ContractBuilder {
    pub fn new(def: &EntityDefinition) -> Self {
        ContractBuilder {
            entity: def.name.clone(),
            pk: def.pk_name().to_string(),
            slots: Vec::new(),
        }
    }

    pub fn slot(mut self, field: &FieldDefinition) -> Self {
        self.slots.push(Slot::from(field));
        self
    }

    pub fn create(&self) -> CreateContract {
        CreateContract {
            entity: self.entity.clone(),
            pk: self.pk.clone(),
            slots: self.slots.clone(),
        }
    }

    pub fn update(self) -> UpdateContract {
        UpdateContract {
            entity: self.entity,
            pk: self.pk,
            slots: self.slots,
        }
    }
}

fn builder_for(def: &EntityDefinition) -> ContractBuilder {
    def.data_fields().fold(ContractBuilder::new(def), ContractBuilder::slot)
}

pub fn derive_create_contract(def: &EntityDefinition) -> CreateContract {
    builder_for(def).create()
}

pub fn derive_update_contract(def: &EntityDefinition) -> UpdateContract {
    builder_for(def).update()
}

impl CreateContract {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn validate(&self, body: &Value) -> Result<Record, AppError> {
        let obj = as_object(body)?;
        let mut violations = Vec::new();
        let mut record = Record::new();
        for slot in &self.slots {
            match obj.get(&slot.name) {
                None => violations.push(FieldViolation::new(&slot.name, "field required")),
                Some(v) => match check_value(slot, v) {
                    Ok(()) => {
                        record.insert(slot.name.clone(), v.clone());
                    }
                    Err(reason) => violations.push(FieldViolation::new(&slot.name, reason)),
                },
            }
        }
        violations.extend(unknown_fields(obj, &self.slots, &self.pk));
        finish(record, violations)
    }
}

impl UpdateContract {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn validate(&self, body: &Value) -> Result<Record, AppError> {
        let obj = as_object(body)?;
        let mut violations = Vec::new();
        let mut changes = Record::new();
        for slot in &self.slots {
            if let Some(v) = obj.get(&slot.name) {
                match check_value(slot, v) {
                    Ok(()) => {
                        changes.insert(slot.name.clone(), v.clone());
                    }
                    Err(reason) => violations.push(FieldViolation::new(&slot.name, reason)),
                }
            }
        }
        violations.extend(unknown_fields(obj, &self.slots, &self.pk));
        finish(changes, violations)
    }
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, AppError> {
    body.as_object()
        .ok_or_else(|| AppError::Validation(vec![FieldViolation::new("body", "must be a JSON object")]))
}

fn unknown_fields(obj: &Map<String, Value>, slots: &[Slot], pk: &str) -> Vec<FieldViolation> {
    obj.keys()
        .filter(|k| !slots.iter().any(|s| &s.name == *k))
        .map(|k| {
            if k == pk {
                FieldViolation::new(k, "primary key is assigned by storage")
            } else {
                FieldViolation::new(k, "unknown field")
            }
        })
        .collect()
}

fn finish(record: Record, violations: Vec<FieldViolation>) -> Result<Record, AppError> {
    if violations.is_empty() {
        Ok(record)
    } else {
        Err(AppError::Validation(violations))
    }
}

fn check_value(slot: &Slot, v: &Value) -> Result<(), String> {
    if v.is_null() {
        return if slot.nullable {
            Ok(())
        } else {
            Err("must not be null".into())
        };
    }
    let ok = match slot.ty {
        PrimitiveType::Integer => v.is_i64() || v.is_u64(),
        PrimitiveType::Float => v.is_number(),
        PrimitiveType::Boolean => v.is_boolean(),
        PrimitiveType::String => v.is_string(),
        PrimitiveType::Datetime => v
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        PrimitiveType::Uuid => v
            .as_str()
            .map(|s| uuid::Uuid::parse_str(s).is_ok())
            .unwrap_or(false),
        PrimitiveType::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("expected {}", slot.ty.as_str()))
    }
}
