//! Flattening of nested payloads into per-schema records.
//!
//! The store delegates this step to a [`Normalizer`]. The contract: given a
//! root payload and its schema name, return every entity found in the
//! payload, keyed by schema then id, with each reference field replaced by
//! the referenced id (or list of ids).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::entity::{id_of, Entity, ID_FIELD};
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::schema::{FieldDeclaration, SchemaMap};

/// Deepest entity nesting [`SchemaNormalizer`] accepts. Matches the
/// recursion limit `serde_json` applies when parsing.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Flattened entities produced by one normalization, keyed by schema then id.
pub type NormalizedEntities = BTreeMap<String, BTreeMap<String, Entity>>;

/// Boundary to the component that flattens nested payloads.
pub trait Normalizer: Send + Sync + fmt::Debug {
    /// Normalizes `data`, whose root entity belongs to `schema`.
    ///
    /// # Errors
    /// Returns a validation error for a malformed payload, or
    /// `UnknownSchema` when a schema it needs is not declared.
    fn normalize(&self, schema: &str, data: &Value) -> StoreResult<NormalizedEntities>;
}

/// Default normalizer driven by the store's schema declarations.
///
/// Nested objects in reference fields are extracted into their own schema
/// and replaced by their id. Plain ids and `null` pass through. An entity
/// that appears several times in one payload is shallow-merged in the order
/// it is encountered. Payloads nesting entities deeper than
/// [`MAX_NESTING_DEPTH`] are rejected.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    schemas: Arc<SchemaMap>,
}

impl SchemaNormalizer {
    /// Creates a normalizer for the given declarations.
    #[must_use]
    pub fn new(schemas: Arc<SchemaMap>) -> Self {
        Self { schemas }
    }

    fn visit(
        &self,
        schema: &str,
        data: &Value,
        depth: usize,
        out: &mut NormalizedEntities,
    ) -> StoreResult<String> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::NestingTooDeep {
                schema: schema.to_string(),
                max_depth: MAX_NESTING_DEPTH,
            }
            .into());
        }

        let declaration = self
            .schemas
            .get(schema)
            .ok_or_else(|| StoreError::unknown_schema(schema, self.schemas.names()))?;

        let Value::Object(fields) = data else {
            return Err(ValidationError::NotAnObject {
                schema: schema.to_string(),
            }
            .into());
        };
        let id = fields
            .get(ID_FIELD)
            .and_then(id_of)
            .ok_or_else(|| ValidationError::MissingIdentifier {
                schema: schema.to_string(),
            })?;

        let mut record = Map::with_capacity(fields.len());
        for (field, value) in fields {
            let flattened = match declaration.field(field) {
                Some(decl) => self.flatten_reference(schema, field, decl, value, depth, out)?,
                None => value.clone(),
            };
            record.insert(field.clone(), flattened);
        }

        let slot = out
            .entry(schema.to_string())
            .or_default()
            .entry(id.clone())
            .or_default();
        slot.merge_from(&Entity::from(record));

        Ok(id)
    }

    fn flatten_reference(
        &self,
        schema: &str,
        field: &str,
        decl: &FieldDeclaration,
        value: &Value,
        depth: usize,
        out: &mut NormalizedEntities,
    ) -> StoreResult<Value> {
        let invalid = || -> StoreError {
            ValidationError::InvalidReference {
                schema: schema.to_string(),
                field: field.to_string(),
            }
            .into()
        };

        match (decl, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldDeclaration::One(target), Value::Object(_)) => {
                Ok(Value::String(self.visit(target, value, depth + 1, out)?))
            }
            (FieldDeclaration::One(_), value) if id_of(value).is_some() => Ok(value.clone()),
            (FieldDeclaration::Many(target), Value::Array(items)) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_object() {
                        ids.push(Value::String(self.visit(target, item, depth + 1, out)?));
                    } else if id_of(item).is_some() {
                        ids.push(item.clone());
                    } else {
                        return Err(invalid());
                    }
                }
                Ok(Value::Array(ids))
            }
            _ => Err(invalid()),
        }
    }
}

impl Normalizer for SchemaNormalizer {
    fn normalize(&self, schema: &str, data: &Value) -> StoreResult<NormalizedEntities> {
        let mut out = NormalizedEntities::new();
        self.visit(schema, data, 1, &mut out)?;
        Ok(out)
    }
}
