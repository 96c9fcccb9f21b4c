//! # kyroref - Normalized entity store with reference tracking
//!
//! kyroref keeps denormalized JSON payloads in flat per-type tables and
//! maintains a reverse index of which entity fields point at which
//! entities. Deleting an entity repairs every field that referenced it:
//! single references become `null` and reference lists lose the id.
//!
//! ## Core Concepts
//!
//! - **Schema**: the entity types and the fields that reference other types
//! - **Entity**: a flat JSON object with an `id`, stored per type
//! - **Entity references**: target entity to the source fields pointing at it
//! - **Snapshot**: an immutable [`EntityStore`] value; transitions return a
//!   new snapshot that shares everything they did not touch
//!
//! ## Usage
//!
//! ```rust
//! use kyroref::{EntitySchema, EntityStore, SchemaMap};
//! use serde_json::json;
//!
//! let schemas = SchemaMap::new()
//!     .entity("users", EntitySchema::new())
//!     .entity("comments", EntitySchema::new().one("commenter", "users"))
//!     .entity(
//!         "articles",
//!         EntitySchema::new().one("author", "users").many("comments", "comments"),
//!     );
//!
//! let store = EntityStore::new(schemas)?
//!     .upsert_one(
//!         "articles",
//!         &json!({"id": "a1", "author": {"id": "u1"}, "comments": [{"id": "c1"}, {"id": "c2"}]}),
//!     )?
//!     .delete_one("comments", "c1")?;
//!
//! let article = store.entity("articles", "a1")?.unwrap();
//! assert_eq!(article.get("comments"), Some(&json!(["c2"])));
//! # Ok::<(), kyroref::StoreError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod graph;
pub mod normalize;
pub mod references;
pub mod schema;
pub mod store;

// Re-export primary types at crate root for convenience
pub use action::{Action, ActionKind};
pub use config::StoreConfig;
pub use dispatch::{DispatcherConfig, SnapshotEvent, SnapshotStream, StoreDispatcher, SubscriptionId};
pub use entity::{EdgeKey, Entity, EntityKey};
pub use error::{ConfigError, StoreError, StoreResult, ValidationError};
pub use graph::{ReferenceGraph, References};
pub use normalize::{NormalizedEntities, Normalizer, SchemaNormalizer};
pub use references::{EntityReferences, ReferenceEdge, RepairSet};
pub use schema::{EntitySchema, FieldDeclaration, RelationType, SchemaMap, SchemaReference, SchemaReferenceIndex};
pub use store::{EntityStore, EntityTable};
