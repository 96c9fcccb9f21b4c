//! Incremental maintenance of the entity reference graph.
//!
//! Upserts diff each reference field's previous ids against its new ids and
//! touch only the edges that changed. Deletions read the incoming edges of
//! the deleted entity and compute corrected copies of every referencing
//! entity, without scanning the entity table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{trace, warn};

use crate::entity::{id_of, EdgeKey, Entity, EntityKey};
use crate::graph::ReferenceGraph;
use crate::normalize::NormalizedEntities;
use crate::schema::{RelationType, SchemaReference, SchemaReferenceIndex};
use crate::store::EntityTable;

/// Metadata of one graph edge: the referencing side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceEdge {
    /// Schema of the referencing entity.
    pub from_schema: String,
    /// Identifier of the referencing entity.
    pub from_id: String,
    /// Field holding the reference.
    pub via_field: String,
    /// Cardinality of that field.
    pub relation_type: RelationType,
}

/// Reference graph between stored entities.
pub type EntityReferences = ReferenceGraph<ReferenceEdge>;

/// Updates the graph for one upserted entity.
///
/// `next` holds only the fields carried by the update. Relations whose
/// field is absent from `next` keep their edges; relations whose field is
/// present are diffed against `previous` (a missing previous entity has no
/// references).
#[must_use]
pub fn update_references_for_upsert(
    mut graph: EntityReferences,
    references: &[SchemaReference],
    schema: &str,
    id: &str,
    previous: Option<&Entity>,
    next: &Entity,
) -> EntityReferences {
    for reference in references {
        if !next.contains_field(&reference.via_field) {
            continue;
        }
        let previous_value = previous.and_then(|entity| entity.get(&reference.via_field));
        let next_value = next.get(&reference.via_field);
        diff_field(&mut graph, reference, schema, id, previous_value, next_value);
    }
    graph
}

/// Updates the graph for every entity of a normalized upsert, in schema
/// order then id order, threading the graph from one entity to the next.
///
/// `table` must be the entity table as it was before the upsert.
#[must_use]
pub fn update_references_for_entities(
    mut graph: EntityReferences,
    index: &SchemaReferenceIndex,
    table: &EntityTable,
    updated: &NormalizedEntities,
) -> EntityReferences {
    for (schema, records) in updated {
        let Some(references) = index.references_for(schema) else {
            continue;
        };
        for (id, record) in records {
            let previous = table.get(schema, id);
            graph = update_references_for_upsert(
                graph,
                references,
                schema,
                id,
                previous.map(|entity| &**entity),
                record,
            );
        }
    }
    graph
}

/// Removes every edge that starts at `entity`, as if all of its reference
/// fields had been set to `null`.
#[must_use]
pub fn release_references_from(
    mut graph: EntityReferences,
    references: &[SchemaReference],
    schema: &str,
    id: &str,
    entity: &Entity,
) -> EntityReferences {
    for reference in references {
        diff_field(
            &mut graph,
            reference,
            schema,
            id,
            entity.get(&reference.via_field),
            None,
        );
    }
    graph
}

fn diff_field(
    graph: &mut EntityReferences,
    reference: &SchemaReference,
    schema: &str,
    id: &str,
    previous_value: Option<&Value>,
    next_value: Option<&Value>,
) {
    let previous_ids = reference.referenced_ids(previous_value);
    let next_ids = reference.referenced_ids(next_value);
    if previous_ids == next_ids {
        return;
    }

    let source = EdgeKey::new(schema, id, reference.via_field.clone());

    for to_id in next_ids.difference(&previous_ids) {
        let target = EntityKey::new(reference.to_schema.clone(), to_id.clone());
        trace!(%source, %target, "add reference");
        graph.insert_edge(
            source.clone(),
            target,
            ReferenceEdge {
                from_schema: schema.to_string(),
                from_id: id.to_string(),
                via_field: reference.via_field.clone(),
                relation_type: reference.relation_type,
            },
        );
    }

    for to_id in previous_ids.difference(&next_ids) {
        let target = EntityKey::new(reference.to_schema.clone(), to_id.clone());
        trace!(%source, %target, "remove reference");
        graph.delete_edge(&source, &target);
    }
}

/// Corrected copies of the entities that referenced a deleted entity,
/// grouped by schema then id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSet {
    by_schema: BTreeMap<String, BTreeMap<String, Entity>>,
}

impl RepairSet {
    /// The corrected copy of one entity, if it needed repair.
    #[must_use]
    pub fn get(&self, schema: &str, id: &str) -> Option<&Entity> {
        self.by_schema.get(schema).and_then(|by_id| by_id.get(id))
    }

    /// Number of repaired entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_schema.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing needs repair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every repaired entity as `(schema, id, entity)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Entity)> {
        self.by_schema.iter().flat_map(|(schema, by_id)| {
            by_id
                .iter()
                .map(move |(id, entity)| (schema.as_str(), id.as_str(), entity))
        })
    }

    /// Consumes the set, yielding the grouped entities.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, BTreeMap<String, Entity>> {
        self.by_schema
    }
}

/// Computes the repairs required before `schema#id` can be deleted.
///
/// Every entity referencing the deleted one gets a corrected copy: a `one`
/// field is set to `null`, a `many` field loses every occurrence of the
/// deleted id while keeping the order of the remaining elements. Several
/// edges from the same entity accumulate on one copy.
#[must_use]
pub fn compute_repairs_for_deletion(
    graph: &EntityReferences,
    table: &EntityTable,
    schema: &str,
    id: &str,
) -> RepairSet {
    let deleted = EntityKey::new(schema, id);
    let mut by_schema: BTreeMap<String, BTreeMap<String, Entity>> = BTreeMap::new();

    for (source, edge) in graph.references_to(&deleted).iter() {
        let Some(current) = table.get(&edge.from_schema, &edge.from_id) else {
            warn!(%source, target = %deleted, "reference from an entity that is not stored");
            continue;
        };

        let repaired = by_schema
            .entry(edge.from_schema.clone())
            .or_default()
            .entry(edge.from_id.clone())
            .or_insert_with(|| Entity::clone(current));
        repair_field(repaired, edge, id);
    }

    RepairSet { by_schema }
}

fn repair_field(entity: &mut Entity, edge: &ReferenceEdge, deleted_id: &str) {
    match edge.relation_type {
        RelationType::One => {
            entity.set(edge.via_field.clone(), Value::Null);
        }
        RelationType::Many => {
            let Some(Value::Array(items)) = entity.get(&edge.via_field) else {
                return;
            };
            let kept: Vec<Value> = items
                .iter()
                .filter(|item| id_of(item).as_deref() != Some(deleted_id))
                .cloned()
                .collect();
            entity.set(edge.via_field.clone(), Value::Array(kept));
        }
    }
}
