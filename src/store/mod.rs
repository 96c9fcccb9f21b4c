//! The entity store state machine.
//!
//! An [`EntityStore`] value is one immutable snapshot:
//! `{schema_references, entity_references, entities}`. Transitions never
//! mutate the snapshot they are called on; they validate, then build the
//! next snapshot on a private copy that shares every untouched table,
//! entity and graph bucket with its predecessor.

mod table;

pub use table::{EntityTable, SchemaEntities};

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::action::Action;
use crate::entity::{id_of, EntityKey, ID_FIELD};
use crate::entity::Entity;
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::graph::References;
use crate::normalize::{Normalizer, SchemaNormalizer};
use crate::references::{
    compute_repairs_for_deletion, release_references_from, update_references_for_entities,
    EntityReferences, ReferenceEdge,
};
use crate::schema::{SchemaMap, SchemaReferenceIndex};

/// One snapshot of the normalized entity store.
#[derive(Clone)]
pub struct EntityStore {
    schema_references: Arc<SchemaReferenceIndex>,
    normalizer: Arc<dyn Normalizer>,
    entity_references: EntityReferences,
    entities: EntityTable,
}

impl EntityStore {
    /// Creates an empty store using the default [`SchemaNormalizer`].
    ///
    /// # Errors
    /// Returns a configuration error if a field references an undeclared
    /// schema.
    pub fn new(schemas: SchemaMap) -> StoreResult<Self> {
        let schemas = Arc::new(schemas);
        let normalizer = Arc::new(SchemaNormalizer::new(Arc::clone(&schemas)));
        Self::with_normalizer(&schemas, normalizer)
    }

    /// Creates an empty store that delegates flattening to `normalizer`.
    ///
    /// # Errors
    /// Returns a configuration error if a field references an undeclared
    /// schema.
    pub fn with_normalizer(
        schemas: &SchemaMap,
        normalizer: Arc<dyn Normalizer>,
    ) -> StoreResult<Self> {
        let schema_references = SchemaReferenceIndex::build(schemas)?;
        let entities = EntityTable::for_schemas(schema_references.schemas());

        debug!(schemas = schemas.len(), "entity store initialized");

        Ok(Self {
            schema_references: Arc::new(schema_references),
            normalizer,
            entity_references: EntityReferences::new(),
            entities,
        })
    }

    /// Static references declared between schemas.
    #[must_use]
    pub fn schema_references(&self) -> &SchemaReferenceIndex {
        &self.schema_references
    }

    /// The entity reference graph.
    #[must_use]
    pub fn entity_references(&self) -> &EntityReferences {
        &self.entity_references
    }

    /// All stored entities.
    #[must_use]
    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Fields currently referencing `schema#id`.
    #[must_use]
    pub fn references_to(&self, schema: &str, id: &str) -> References<'_, ReferenceEdge> {
        self.entity_references
            .references_to(&EntityKey::new(schema, id))
    }

    /// Looks up one entity.
    ///
    /// # Errors
    /// Returns `UnknownSchema` if `schema` is not declared.
    pub fn entity(&self, schema: &str, id: &str) -> StoreResult<Option<&Arc<Entity>>> {
        self.ensure_schema(schema)?;
        Ok(self.entities.get(schema, id))
    }

    /// Selects entities of one schema.
    ///
    /// With `Some(ids)` the listed entities are returned in list order and
    /// unknown ids are skipped. With `None` every entity of the schema is
    /// returned in id order.
    ///
    /// # Errors
    /// Returns `UnknownSchema` if `schema` is not declared.
    pub fn select_entities(&self, schema: &str, ids: Option<&[&str]>) -> StoreResult<Vec<Arc<Entity>>> {
        self.ensure_schema(schema)?;
        let Some(by_id) = self.entities.schema(schema) else {
            return Ok(Vec::new());
        };

        let selected = match ids {
            Some(ids) => ids.iter().filter_map(|id| by_id.get(*id)).cloned().collect(),
            None => by_id.values().cloned().collect(),
        };
        Ok(selected)
    }

    /// Inserts or shallow-merges one denormalized payload.
    ///
    /// Every entity found in the payload is merged into its table, and the
    /// reference graph is updated for every reference field the payload
    /// carries.
    ///
    /// # Errors
    /// - `UnknownSchema`: `schema` is not declared
    /// - `MissingIdentifier`: the payload (or a nested entity) has no id
    /// - `NotAnObject` / `InvalidReference`: malformed payload
    /// - `NestingTooDeep`: nested entities exceed the normalizer's depth bound
    /// - `UnknownSchema`: the normalizer produced records of an undeclared schema
    pub fn upsert_one(&self, schema: &str, data: &Value) -> StoreResult<Self> {
        let mut next = self.clone();
        next.apply_upsert(schema, data)?;
        Ok(next)
    }

    /// Applies [`Self::upsert_one`] for each payload in order. Later
    /// payloads observe the effects of earlier ones. If any payload fails,
    /// none of them are applied.
    ///
    /// # Errors
    /// Same as [`Self::upsert_one`], for the first failing payload.
    pub fn upsert_many(&self, schema: &str, data: &[Value]) -> StoreResult<Self> {
        self.ensure_schema(schema)?;
        let mut next = self.clone();
        for payload in data {
            next.apply_upsert(schema, payload)?;
        }
        Ok(next)
    }

    /// Deletes one entity.
    ///
    /// Every entity referencing it is repaired (`one` fields become `null`,
    /// `many` fields lose the id), all edges pointing at it are dropped, and
    /// so are the edges it held itself. Deleting an id that is not stored
    /// still repairs any remaining references to it.
    ///
    /// # Errors
    /// Returns `UnknownSchema` if `schema` is not declared.
    pub fn delete_one(&self, schema: &str, id: &str) -> StoreResult<Self> {
        self.ensure_schema(schema)?;

        let repairs = compute_repairs_for_deletion(&self.entity_references, &self.entities, schema, id);
        let deleted = EntityKey::new(schema, id);

        let mut next = self.clone();
        let mut graph = std::mem::take(&mut next.entity_references);
        graph.take_references_to(&deleted);

        if let Some(entity) = self.entities.get(schema, id) {
            let references = self
                .schema_references
                .references_for(schema)
                .unwrap_or_default();
            graph = release_references_from(graph, references, schema, id, entity);
        }

        let repaired = repairs.len();
        for (repair_schema, repair_id, entity) in repairs.iter() {
            next.entities.replace(repair_schema, repair_id, entity.clone());
        }
        let removed = next.entities.remove(schema, id).is_some();
        next.entity_references = graph;

        debug!(schema, id, removed, repaired, "deleted entity");
        Ok(next)
    }

    /// Applies an action. Unrecognized actions return the snapshot
    /// unchanged.
    ///
    /// # Errors
    /// Same as the transition the action routes to.
    pub fn apply(&self, action: &Action) -> StoreResult<Self> {
        match action {
            Action::UpsertOne { schema, data } => self.upsert_one(schema, data),
            Action::UpsertMany { schema, data } => self.upsert_many(schema, data),
            Action::DeleteOne { schema, id } => self.delete_one(schema, id),
            Action::Unrecognized => Ok(self.clone()),
        }
    }

    fn apply_upsert(&mut self, schema: &str, data: &Value) -> StoreResult<()> {
        self.ensure_schema(schema)?;

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

        let updated = self.normalizer.normalize(schema, data)?;
        for touched in updated.keys() {
            self.ensure_schema(touched)?;
        }

        let graph = std::mem::take(&mut self.entity_references);
        self.entity_references =
            update_references_for_entities(graph, &self.schema_references, &self.entities, &updated);

        let mut touched = 0usize;
        for (touched_schema, records) in &updated {
            for (touched_id, record) in records {
                self.entities.merge(touched_schema, touched_id, record);
                touched += 1;
            }
        }

        debug!(schema, id = %id, touched, "upserted entity");
        Ok(())
    }

    fn ensure_schema(&self, schema: &str) -> StoreResult<()> {
        if self.schema_references.contains(schema) {
            Ok(())
        } else {
            Err(StoreError::unknown_schema(
                schema,
                self.schema_references.schemas(),
            ))
        }
    }
}

impl PartialEq for EntityStore {
    fn eq(&self, other: &Self) -> bool {
        self.schema_references == other.schema_references
            && self.entity_references == other.entity_references
            && self.entities == other.entities
    }
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("schema_references", &self.schema_references)
            .field("entity_references", &self.entity_references)
            .field("entities", &self.entities)
            .finish_non_exhaustive()
    }
}

impl Serialize for EntityStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EntityStore", 3)?;
        state.serialize_field("schema_references", &*self.schema_references)?;
        state.serialize_field("entity_references", &self.entity_references)?;
        state.serialize_field("entities", &self.entities)?;
        state.end()
    }
}
