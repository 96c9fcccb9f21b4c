//! Reverse reference index.
//!
//! Maps a target entity to the set of source fields that currently point at
//! it, each carrying edge metadata. The graph knows nothing about schemas or
//! entity contents.
//!
//! Key invariants:
//! - The target index is a persistent hash map: cloning a graph is constant
//!   time and an update copies only the path to the touched target.
//! - Buckets are shared (`Arc`) between graph versions. Operations only
//!   replace the bucket of the target they touch, so unrelated buckets stay
//!   pointer-identical across versions.
//! - A bucket that becomes empty is dropped; an absent target and an empty
//!   target are indistinguishable to readers.

use std::collections::BTreeMap;
use std::sync::Arc;

use imbl::HashMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::entity::{EdgeKey, EntityKey};

/// Incoming edges of one target, keyed by source field.
pub type Edges<M> = BTreeMap<EdgeKey, M>;

/// Reverse index from target entities to the fields referencing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceGraph<M> {
    targets: HashMap<EntityKey, Arc<Edges<M>>>,
}

impl<M> Default for ReferenceGraph<M> {
    fn default() -> Self {
        Self {
            targets: HashMap::default(),
        }
    }
}

impl<M: Clone + PartialEq> ReferenceGraph<M> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Incoming edges of `target`. Unknown targets yield an empty view.
    #[must_use]
    pub fn references_to(&self, target: &EntityKey) -> References<'_, M> {
        References {
            edges: self.targets.get(target).map(|edges| &**edges),
        }
    }

    /// The shared bucket for `target`, for identity-based change detection.
    #[must_use]
    pub fn bucket(&self, target: &EntityKey) -> Option<&Arc<Edges<M>>> {
        self.targets.get(target)
    }

    /// Returns the graph with the edge `source -> target` set to `metadata`.
    #[must_use]
    pub fn add_edge(mut self, source: EdgeKey, target: EntityKey, metadata: M) -> Self {
        self.insert_edge(source, target, metadata);
        self
    }

    /// Returns the graph without the edge `source -> target`.
    #[must_use]
    pub fn remove_edge(mut self, source: &EdgeKey, target: &EntityKey) -> Self {
        self.delete_edge(source, target);
        self
    }

    /// Returns the graph without any edge pointing at `target`.
    #[must_use]
    pub fn remove_references_to(mut self, target: &EntityKey) -> Self {
        self.take_references_to(target);
        self
    }

    /// In-place form of [`Self::add_edge`]. Returns false when the edge was
    /// already present with identical metadata, in which case the bucket is
    /// left untouched.
    pub fn insert_edge(&mut self, source: EdgeKey, target: EntityKey, metadata: M) -> bool {
        if self
            .targets
            .get(&target)
            .is_some_and(|bucket| bucket.get(&source) == Some(&metadata))
        {
            return false;
        }

        match self.targets.get_mut(&target) {
            Some(bucket) => {
                Arc::make_mut(bucket).insert(source, metadata);
            }
            None => {
                let mut edges = Edges::new();
                edges.insert(source, metadata);
                self.targets.insert(target, Arc::new(edges));
            }
        }
        true
    }

    /// In-place form of [`Self::remove_edge`]. Returns the removed metadata.
    pub fn delete_edge(&mut self, source: &EdgeKey, target: &EntityKey) -> Option<M> {
        if !self.targets.get(target)?.contains_key(source) {
            return None;
        }

        let bucket = self.targets.get_mut(target)?;

        let removed = Arc::make_mut(bucket).remove(source);
        if bucket.is_empty() {
            self.targets.remove(target);
        }
        removed
    }

    /// Detaches and returns every edge pointing at `target`.
    pub fn take_references_to(&mut self, target: &EntityKey) -> Option<Arc<Edges<M>>> {
        self.targets.remove(target)
    }

    /// Number of targets with at least one incoming edge.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.targets.values().map(|edges| edges.len()).sum()
    }

    /// Returns true if the graph holds no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Every target with its incoming edges, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Edges<M>)> {
        self.targets.iter().map(|(target, edges)| (target, &**edges))
    }
}

/// Read-only view of the edges pointing at one target.
#[derive(Debug, Clone, Copy)]
pub struct References<'a, M> {
    edges: Option<&'a Edges<M>>,
}

impl<'a, M> References<'a, M> {
    /// Number of incoming edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.map_or(0, BTreeMap::len)
    }

    /// Returns true if nothing points at the target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata of the edge from `source`, if present.
    #[must_use]
    pub fn get(&self, source: &EdgeKey) -> Option<&'a M> {
        self.edges.and_then(|edges| edges.get(source))
    }

    /// Returns true if `source` points at the target.
    #[must_use]
    pub fn contains(&self, source: &EdgeKey) -> bool {
        self.get(source).is_some()
    }

    /// Incoming edges ordered by source key.
    pub fn iter(&self) -> impl Iterator<Item = (&'a EdgeKey, &'a M)> {
        self.edges.into_iter().flat_map(BTreeMap::iter)
    }
}

impl<M: Serialize> Serialize for ReferenceGraph<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Sorted output keeps dumps stable across runs.
        let sorted: BTreeMap<&EntityKey, &Edges<M>> = self
            .targets
            .iter()
            .map(|(target, edges)| (target, &**edges))
            .collect();

        let mut map = serializer.serialize_map(Some(sorted.len()))?;
        for (target, edges) in sorted {
            let bucket: BTreeMap<String, &M> = edges
                .iter()
                .map(|(source, metadata)| (source.to_string(), metadata))
                .collect();
            map.serialize_entry(&target.to_string(), &bucket)?;
        }
        map.end()
    }
}
