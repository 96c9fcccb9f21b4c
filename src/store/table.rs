//! Per-schema entity tables.
//!
//! Tables and entities are shared (`Arc`) between snapshots. Id maps are
//! persistent ordered maps: copying one is constant time and a write copies
//! only the path to the written id, so the cost of a transition does not
//! depend on how many entities a schema holds.

use std::collections::BTreeMap;
use std::sync::Arc;

use imbl::OrdMap;
use serde::Serialize;

use crate::entity::Entity;

/// Entities of one schema, keyed by id.
pub type SchemaEntities = OrdMap<String, Arc<Entity>>;

/// Entities of every schema, keyed by schema name then id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EntityTable {
    schemas: BTreeMap<String, Arc<SchemaEntities>>,
}

impl EntityTable {
    /// An empty table with one (empty) entry per schema.
    #[must_use]
    pub fn for_schemas<'a>(schemas: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|name| (name.to_string(), Arc::new(SchemaEntities::new())))
                .collect(),
        }
    }

    /// Looks up one entity.
    #[must_use]
    pub fn get(&self, schema: &str, id: &str) -> Option<&Arc<Entity>> {
        self.schemas.get(schema).and_then(|by_id| by_id.get(id))
    }

    /// All entities of one schema.
    #[must_use]
    pub fn schema(&self, schema: &str) -> Option<&Arc<SchemaEntities>> {
        self.schemas.get(schema)
    }

    /// Returns true if `schema` has a table.
    #[must_use]
    pub fn contains_schema(&self, schema: &str) -> bool {
        self.schemas.contains_key(schema)
    }

    /// Total number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.values().map(|by_id| by_id.len()).sum()
    }

    /// Returns true if no entity is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every schema with its entities.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaEntities)> {
        self.schemas
            .iter()
            .map(|(name, by_id)| (name.as_str(), &**by_id))
    }

    /// Shallow-merges `fields` onto the stored entity (creating it if needed).
    pub fn merge(&mut self, schema: &str, id: &str, fields: &Entity) {
        let by_id = Arc::make_mut(self.schemas.entry(schema.to_string()).or_default());
        match by_id.get_mut(id) {
            Some(existing) => Arc::make_mut(existing).merge_from(fields),
            None => {
                by_id.insert(id.to_string(), Arc::new(fields.clone()));
            }
        }
    }

    /// Replaces the stored entity wholesale.
    pub fn replace(&mut self, schema: &str, id: &str, entity: Entity) {
        let by_id = Arc::make_mut(self.schemas.entry(schema.to_string()).or_default());
        by_id.insert(id.to_string(), Arc::new(entity));
    }

    /// Removes one entity, returning it.
    pub fn remove(&mut self, schema: &str, id: &str) -> Option<Arc<Entity>> {
        let by_id = self.schemas.get_mut(schema)?;
        if !by_id.contains_key(id) {
            return None;
        }
        Arc::make_mut(by_id).remove(id)
    }
}
