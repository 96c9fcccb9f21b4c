//! Entity records and the keys that address them.
//!
//! Entities are flat JSON objects owned by the store. Once normalized, every
//! reference-bearing field holds an identifier, a list of identifiers, or
//! `null`. [`EntityKey`] addresses one entity, [`EdgeKey`] addresses one
//! reference-bearing field on one entity.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Name of the mandatory identifier field.
pub const ID_FIELD: &str = "id";

/// Reads an identifier out of a JSON value.
///
/// Non-empty strings are taken as-is and integers are rendered in decimal.
/// Everything else (including `null` and `""`) is not an identifier.
///
/// # Examples
///
/// ```
/// use kyroref::entity::id_of;
/// use serde_json::json;
///
/// assert_eq!(id_of(&json!("a1")), Some("a1".to_string()));
/// assert_eq!(id_of(&json!(7)), Some("7".to_string()));
/// assert_eq!(id_of(&json!("")), None);
/// assert_eq!(id_of(&json!(null)), None);
/// ```
#[must_use]
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Address of one entity: its schema name and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Schema (type) name.
    pub schema: String,
    /// Identifier, unique within the schema.
    pub id: String,
}

impl EntityKey {
    /// Creates a new entity key.
    #[must_use]
    pub fn new(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// The key of the field `field` on this entity.
    #[must_use]
    pub fn field(&self, field: impl Into<String>) -> EdgeKey {
        EdgeKey::new(self.schema.clone(), self.id.clone(), field)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.schema, self.id)
    }
}

/// Address of one reference-bearing field on one entity.
///
/// A single edge key may be the source of zero, one, or many graph edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    /// Schema of the referencing entity.
    pub schema: String,
    /// Identifier of the referencing entity.
    pub id: String,
    /// Field holding the reference.
    pub field: String,
}

impl EdgeKey {
    /// Creates a new edge key.
    #[must_use]
    pub fn new(schema: impl Into<String>, id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            id: id.into(),
            field: field.into(),
        }
    }

    /// The entity owning this field.
    #[must_use]
    pub fn entity(&self) -> EntityKey {
        EntityKey::new(self.schema.clone(), self.id.clone())
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.schema, self.id, self.field)
    }
}

/// A flat entity record.
///
/// Field order follows insertion order. The store never hands out mutable
/// access to a stored entity; reads return shared, immutable copies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON payload, rejecting anything that is not an object.
    ///
    /// # Errors
    /// Returns `NotAnObject` if `value` is not a JSON object.
    pub fn from_value(schema: &str, value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(ValidationError::NotAnObject {
                schema: schema.to_string(),
            }),
        }
    }

    /// The record's identifier, if it carries a valid one.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.0.get(ID_FIELD).and_then(id_of)
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns true if the record carries `field`, even when it is `null`.
    #[must_use]
    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Shallow merge: every field of `other` overwrites the same field here,
    /// fields absent from `other` are kept.
    pub fn merge_from(&mut self, other: &Entity) {
        for (field, value) in &other.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// The underlying field map.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts the record into a JSON object value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
