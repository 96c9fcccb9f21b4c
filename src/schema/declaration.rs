//! Schema declarations.
//!
//! The JSON form mirrors the usual normalizer notation: a string names the
//! target schema of a single reference, a one-element list names the target
//! schema of a list of references.
//!
//! ```json
//! {
//!   "authors": {},
//!   "comments": {},
//!   "articles": { "author": "authors", "comments": ["comments"] }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Declared shape of one reference-bearing field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawField", into = "RawField")]
pub enum FieldDeclaration {
    /// The field holds a single reference to the named schema.
    One(String),
    /// The field holds a list of references to the named schema.
    Many(String),
}

impl FieldDeclaration {
    /// Name of the referenced schema.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::One(target) | Self::Many(target) => target,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawField {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<RawField> for FieldDeclaration {
    type Error = String;

    fn try_from(raw: RawField) -> Result<Self, Self::Error> {
        match raw {
            RawField::One(target) => Ok(Self::One(target)),
            RawField::Many(mut targets) if targets.len() == 1 => {
                Ok(Self::Many(targets.remove(0)))
            }
            RawField::Many(targets) => Err(format!(
                "a list reference must name exactly one schema, got {}",
                targets.len()
            )),
        }
    }
}

impl From<FieldDeclaration> for RawField {
    fn from(decl: FieldDeclaration) -> Self {
        match decl {
            FieldDeclaration::One(target) => Self::One(target),
            FieldDeclaration::Many(target) => Self::Many(vec![target]),
        }
    }
}

/// Reference-bearing fields of one entity schema, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySchema {
    fields: IndexMap<String, FieldDeclaration>,
}

impl EntitySchema {
    /// A schema with no reference fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `field` as a single reference to `target`.
    #[must_use]
    pub fn one(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FieldDeclaration::One(target.into()));
        self
    }

    /// Declares `field` as a list of references to `target`.
    #[must_use]
    pub fn many(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FieldDeclaration::Many(target.into()));
        self
    }

    /// Declaration of a single field.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&FieldDeclaration> {
        self.fields.get(field)
    }

    /// All declared reference fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDeclaration)> {
        self.fields.iter().map(|(name, decl)| (name.as_str(), decl))
    }
}

/// Every declared entity schema, keyed by name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap {
    schemas: IndexMap<String, EntitySchema>,
}

impl SchemaMap {
    /// An empty schema map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an entity schema.
    #[must_use]
    pub fn entity(mut self, name: impl Into<String>, schema: EntitySchema) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Parses schema declarations from JSON.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed JSON or on a list
    /// declaration that does not name exactly one schema. Target schemas are
    /// checked later, when a store is built.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse {
            message: format!("schema declarations: {e}"),
        })
    }

    /// Looks up a schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.schemas.get(name)
    }

    /// Returns true if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Declared schema names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// All schemas with their names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntitySchema)> {
        self.schemas.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// Number of declared schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
