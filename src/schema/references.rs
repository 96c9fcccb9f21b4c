//! Static analysis of the references declared between schemas.
//!
//! For every schema this records which schemas it may reference, through
//! which field, and with which cardinality. The result is computed once per
//! store and never changes afterwards.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{id_of, ID_FIELD};
use crate::error::ConfigError;

use super::declaration::{FieldDeclaration, SchemaMap};

/// Cardinality of a reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// The field holds a single target id.
    One,
    /// The field holds a list of target ids.
    Many,
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "one"),
            Self::Many => write!(f, "many"),
        }
    }
}

/// One declared reference from an owning schema to `to_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaReference {
    /// Referenced schema.
    pub to_schema: String,
    /// Field of the owning schema that holds the reference.
    pub via_field: String,
    /// Cardinality of the field.
    pub relation_type: RelationType,
}

impl SchemaReference {
    /// Ids referenced by a field value.
    ///
    /// A missing or `null` value references nothing. A `one` field yields
    /// its id as a single-element set, a `many` field yields every id in its
    /// list. Duplicates collapse.
    #[must_use]
    pub fn referenced_ids(&self, value: Option<&Value>) -> BTreeSet<String> {
        match (self.relation_type, value) {
            (_, None | Some(Value::Null)) => BTreeSet::new(),
            (RelationType::One, Some(value)) => id_of(value).into_iter().collect(),
            (RelationType::Many, Some(Value::Array(items))) => {
                items.iter().filter_map(id_of).collect()
            }
            (RelationType::Many, Some(_)) => BTreeSet::new(),
        }
    }
}

/// Declared references of every schema.
///
/// Schemas without reference fields map to an empty list, so a key lookup
/// alone tells declared schemas apart from unknown ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaReferenceIndex {
    by_schema: IndexMap<String, Vec<SchemaReference>>,
}

impl SchemaReferenceIndex {
    /// Analyzes schema declarations.
    ///
    /// # Errors
    /// - `UndeclaredTarget`: a field references a schema that is not declared
    /// - `IdFieldReference`: the `id` field is declared as a reference
    pub fn build(schemas: &SchemaMap) -> Result<Self, ConfigError> {
        let mut by_schema = IndexMap::with_capacity(schemas.len());

        for (name, schema) in schemas.iter() {
            let mut references = Vec::new();

            for (field, decl) in schema.fields() {
                if field == ID_FIELD {
                    return Err(ConfigError::IdFieldReference {
                        schema: name.to_string(),
                    });
                }
                if !schemas.contains(decl.target()) {
                    return Err(ConfigError::UndeclaredTarget {
                        schema: name.to_string(),
                        field: field.to_string(),
                        target: decl.target().to_string(),
                    });
                }

                let relation_type = match decl {
                    FieldDeclaration::One(_) => RelationType::One,
                    FieldDeclaration::Many(_) => RelationType::Many,
                };
                references.push(SchemaReference {
                    to_schema: decl.target().to_string(),
                    via_field: field.to_string(),
                    relation_type,
                });
            }

            by_schema.insert(name.to_string(), references);
        }

        Ok(Self { by_schema })
    }

    /// References declared by `schema`, or `None` if it is not declared.
    #[must_use]
    pub fn references_for(&self, schema: &str) -> Option<&[SchemaReference]> {
        self.by_schema.get(schema).map(Vec::as_slice)
    }

    /// Returns true if `schema` is declared.
    #[must_use]
    pub fn contains(&self, schema: &str) -> bool {
        self.by_schema.contains_key(schema)
    }

    /// Declared schema names, in declaration order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.by_schema.keys().map(String::as_str)
    }

    /// Every declared schema with its references.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SchemaReference])> {
        self.by_schema
            .iter()
            .map(|(name, refs)| (name.as_str(), refs.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;
    use serde_json::json;

    fn reference(to: &str, via: &str, relation_type: RelationType) -> SchemaReference {
        SchemaReference {
            to_schema: to.to_string(),
            via_field: via.to_string(),
            relation_type,
        }
    }

    #[test]
    fn schema_without_references_maps_to_empty_list() {
        let index =
            SchemaReferenceIndex::build(&SchemaMap::new().entity("articles", EntitySchema::new()))
                .unwrap();
        assert_eq!(index.references_for("articles"), Some(&[][..]));
        assert_eq!(index.references_for("authors"), None);
    }

    #[test]
    fn one_to_one_reference() {
        let schemas = SchemaMap::new()
            .entity("authors", EntitySchema::new())
            .entity("articles", EntitySchema::new().one("author", "authors"));
        let index = SchemaReferenceIndex::build(&schemas).unwrap();

        assert_eq!(
            index.references_for("articles").unwrap(),
            &[reference("authors", "author", RelationType::One)]
        );
        assert!(index.references_for("authors").unwrap().is_empty());
    }

    #[test]
    fn one_to_many_reference_keeps_field_order() {
        let schemas = SchemaMap::new()
            .entity("users", EntitySchema::new())
            .entity("comments", EntitySchema::new())
            .entity(
                "articles",
                EntitySchema::new()
                    .many("comments", "comments")
                    .one("author", "users")
                    .one("editor", "users"),
            );
        let index = SchemaReferenceIndex::build(&schemas).unwrap();

        assert_eq!(
            index.references_for("articles").unwrap(),
            &[
                reference("comments", "comments", RelationType::Many),
                reference("users", "author", RelationType::One),
                reference("users", "editor", RelationType::One),
            ]
        );
    }

    #[test]
    fn undeclared_target_is_a_configuration_error() {
        let schemas = SchemaMap::new().entity("articles", EntitySchema::new().one("author", "users"));
        let err = SchemaReferenceIndex::build(&schemas).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UndeclaredTarget {
                schema: "articles".to_string(),
                field: "author".to_string(),
                target: "users".to_string(),
            }
        );
    }

    #[test]
    fn id_field_cannot_be_a_reference() {
        let schemas = SchemaMap::new()
            .entity("users", EntitySchema::new())
            .entity("profiles", EntitySchema::new().one("id", "users"));
        assert!(matches!(
            SchemaReferenceIndex::build(&schemas),
            Err(ConfigError::IdFieldReference { .. })
        ));
    }

    #[test]
    fn self_reference_is_allowed() {
        let schemas =
            SchemaMap::new().entity("nodes", EntitySchema::new().many("children", "nodes"));
        let index = SchemaReferenceIndex::build(&schemas).unwrap();
        assert_eq!(index.references_for("nodes").unwrap().len(), 1);
    }

    #[test]
    fn referenced_ids_follow_relation_type() {
        let one = reference("authors", "author", RelationType::One);
        let many = reference("comments", "comments", RelationType::Many);

        assert!(one.referenced_ids(None).is_empty());
        assert!(one.referenced_ids(Some(&json!(null))).is_empty());
        assert_eq!(
            one.referenced_ids(Some(&json!("a1"))).into_iter().collect::<Vec<_>>(),
            vec!["a1"]
        );
        assert_eq!(
            many.referenced_ids(Some(&json!(["c2", "c1", "c2", null])))
                .into_iter()
                .collect::<Vec<_>>(),
            vec!["c1", "c2"]
        );
        assert!(many.referenced_ids(Some(&json!("c1"))).is_empty());
    }
}
