//! Store command definitions.
//!
//! Actions are the serializable form of the store's transitions. Any action
//! whose `type` is not recognized deserializes to [`Action::Unrecognized`]
//! and leaves the store unchanged when applied.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, StoreError};

/// All store transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Insert or shallow-merge one (possibly nested) entity payload.
    UpsertOne {
        /// Schema of the root entity.
        schema: String,
        /// Denormalized payload.
        data: Value,
    },

    /// Apply `UpsertOne` for each payload in order.
    UpsertMany {
        /// Schema of every root entity.
        schema: String,
        /// Denormalized payloads.
        data: Vec<Value>,
    },

    /// Delete one entity and repair everything that referenced it.
    DeleteOne {
        /// Schema of the entity.
        schema: String,
        /// Identifier of the entity.
        id: String,
    },

    /// Any action this store does not handle.
    #[serde(other)]
    Unrecognized,
}

impl Action {
    /// Creates an `UpsertOne` action.
    pub fn upsert_one(schema: impl Into<String>, data: Value) -> Self {
        Self::UpsertOne {
            schema: schema.into(),
            data,
        }
    }

    /// Creates an `UpsertMany` action.
    pub fn upsert_many(schema: impl Into<String>, data: Vec<Value>) -> Self {
        Self::UpsertMany {
            schema: schema.into(),
            data,
        }
    }

    /// Creates a `DeleteOne` action.
    pub fn delete_one(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DeleteOne {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// The kind of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::UpsertOne { .. } => ActionKind::UpsertOne,
            Self::UpsertMany { .. } => ActionKind::UpsertMany,
            Self::DeleteOne { .. } => ActionKind::DeleteOne,
            Self::Unrecognized => ActionKind::Unrecognized,
        }
    }

    /// Returns false for actions the store ignores.
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }

    /// Parses an action from JSON. An unknown `type` is not an error; it
    /// yields [`Action::Unrecognized`].
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` (wrapped in `StoreError::Config`) on
    /// malformed JSON or when a known action lacks one of its fields.
    pub fn from_json(s: &str) -> Result<Self, StoreError> {
        serde_json::from_str(s).map_err(|e| {
            ConfigError::Parse {
                message: format!("action: {e}"),
            }
            .into()
        })
    }
}

/// Discriminant of an [`Action`], carried by snapshot events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// See [`Action::UpsertOne`].
    UpsertOne,
    /// See [`Action::UpsertMany`].
    UpsertMany,
    /// See [`Action::DeleteOne`].
    DeleteOne,
    /// See [`Action::Unrecognized`].
    Unrecognized,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpsertOne => write!(f, "upsert_one"),
            Self::UpsertMany => write!(f, "upsert_many"),
            Self::DeleteOne => write!(f, "delete_one"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_shape_is_tagged_by_type() {
        let action = Action::upsert_one("articles", json!({"id": "a1"}));
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "upsert_one", "schema": "articles", "data": {"id": "a1"}})
        );

        let parsed =
            Action::from_json(r#"{"type": "delete_one", "schema": "comments", "id": "c1"}"#)
                .unwrap();
        assert_eq!(parsed, Action::delete_one("comments", "c1"));
        assert_eq!(parsed.kind(), ActionKind::DeleteOne);
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let parsed = Action::from_json(r#"{"type": "probe"}"#).unwrap();
        assert_eq!(parsed, Action::Unrecognized);
        assert!(!parsed.is_recognized());

        let parsed = Action::from_json(r#"{"type": "something_else", "payload": 1}"#).unwrap();
        assert_eq!(parsed.kind(), ActionKind::Unrecognized);
    }

    #[test]
    fn malformed_action_is_a_parse_error() {
        let err = Action::from_json(r#"{"type": "delete_one", "schema": "comments"}"#).unwrap_err();
        assert!(err.is_config());
    }
}
