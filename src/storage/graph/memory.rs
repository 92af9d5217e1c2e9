//! In-memory graph backend for testing.
//!
//! Provides a fast, non-persistent implementation of [`GraphBackend`] for use
//! in unit tests and development scenarios.

use crate::models::{
    Entity, EntityId, EntityQuery, Relationship, RelationshipKey, RelationshipQuery,
};
use crate::storage::traits::graph::{GraphBackend, GraphStats, UpsertOutcome};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whole-graph state behind one lock so merges are atomic.
#[derive(Debug, Default)]
struct GraphState {
    entities: HashMap<EntityId, Entity>,
    relationships: BTreeMap<u64, Relationship>,
    relationship_index: HashMap<RelationshipKey, u64>,
    next_entity_seq: u64,
    next_relationship_seq: u64,
}

impl GraphState {
    fn insert_relationship(&mut self, relationship: Relationship) -> bool {
        let key = relationship.key();
        if self.relationship_index.contains_key(&key) {
            return false;
        }
        self.next_relationship_seq += 1;
        let seq = self.next_relationship_seq;
        self.relationship_index.insert(key, seq);
        self.relationships.insert(seq, relationship);
        true
    }

    fn remove_relationships_where(&mut self, pred: impl Fn(&Relationship) -> bool) -> Vec<Relationship> {
        let seqs: Vec<u64> = self
            .relationships
            .iter()
            .filter(|(_, rel)| pred(rel))
            .map(|(seq, _)| *seq)
            .collect();

        let mut removed = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if let Some(rel) = self.relationships.remove(&seq) {
                self.relationship_index.remove(&rel.key());
                removed.push(rel);
            }
        }
        removed
    }
}

/// In-memory graph backend for testing.
///
/// Uses a single `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust,ignore
/// use manga_graph::storage::{GraphBackend, InMemoryGraphBackend};
///
/// let backend = InMemoryGraphBackend::new();
/// // Use for testing...
/// ```
#[derive(Debug, Default)]
pub struct InMemoryGraphBackend {
    state: RwLock<GraphState>,
}

impl InMemoryGraphBackend {
    /// Creates a new empty in-memory graph backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entities stored.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.read().map(|s| s.entities.len()).unwrap_or(0)
    }

    /// Returns the number of relationships stored.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.state.read().map(|s| s.relationships.len()).unwrap_or(0)
    }

    fn read(&self, operation: &str) -> Result<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    fn write(&self, operation: &str) -> Result<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }
}

impl GraphBackend for InMemoryGraphBackend {
    fn upsert_entity(&self, entity: &Entity) -> Result<UpsertOutcome> {
        let mut state = self.write("upsert_entity")?;

        if let Some(existing) = state.entities.get_mut(&entity.id) {
            let mut changed = existing.absorb_properties(&entity.properties);
            if existing.name != entity.name {
                existing.name.clone_from(&entity.name);
                changed = true;
            }
            if existing.original_name.is_none() && entity.original_name.is_some() {
                existing.original_name.clone_from(&entity.original_name);
                changed = true;
            }
            return Ok(if changed {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Unchanged
            });
        }

        state.next_entity_seq += 1;
        let mut stored = entity.clone();
        stored.sequence = state.next_entity_seq;
        state.entities.insert(stored.id.clone(), stored);
        Ok(UpsertOutcome::Created)
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        let state = self.read("get_entity")?;
        Ok(state.entities.get(id).cloned())
    }

    fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        let state = self.read("query_entities")?;

        let mut results: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        results.sort_by_key(|e| e.sequence);

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn rename_entity(&self, id: &EntityId, name: &str) -> Result<bool> {
        let mut state = self.write("rename_entity")?;
        Ok(state.entities.get_mut(id).is_some_and(|entity| {
            entity.name = name.to_string();
            true
        }))
    }

    fn merge_entities(&self, survivor: &EntityId, others: &[EntityId]) -> Result<Entity> {
        let mut state = self.write("merge_entities")?;

        let mut merged = state
            .entities
            .get(survivor)
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("survivor entity not found: {survivor}")))?;

        for other_id in others.iter().filter(|id| *id != survivor) {
            let Some(other) = state.entities.remove(other_id) else {
                continue;
            };

            let moved = state.remove_relationships_where(|rel| rel.touches(other_id));
            for mut rel in moved {
                if rel.from_entity == *other_id {
                    rel.from_entity = survivor.clone();
                }
                if rel.to_entity == *other_id {
                    rel.to_entity = survivor.clone();
                }
                if rel.from_entity != rel.to_entity {
                    state.insert_relationship(rel);
                }
            }

            merged.absorb_properties(&other.properties);
            if merged.original_name.is_none() {
                merged.original_name = other.original_name;
            }
        }

        state.entities.insert(survivor.clone(), merged.clone());
        Ok(merged)
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<bool> {
        let mut state = self.write("upsert_relationship")?;

        for endpoint in [&relationship.from_entity, &relationship.to_entity] {
            if !state.entities.contains_key(endpoint) {
                return Err(Error::InvalidInput(format!(
                    "relationship endpoint not found: {endpoint}"
                )));
            }
        }

        Ok(state.insert_relationship(relationship.clone()))
    }

    fn query_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        let state = self.read("query_relationships")?;

        let matching = state.relationships.values().filter(|rel| query.matches(rel));
        let results = match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        };
        Ok(results)
    }

    fn get_stats(&self) -> Result<GraphStats> {
        let state = self.read("get_stats")?;

        let mut stats = GraphStats::new();
        stats.entity_count = state.entities.len();
        for entity in state.entities.values() {
            *stats.entities_by_type.entry(entity.entity_type).or_insert(0) += 1;
        }
        stats.relationship_count = state.relationships.len();
        for rel in state.relationships.values() {
            *stats
                .relationships_by_type
                .entry(rel.relationship_type)
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.write("clear")?;
        *state = GraphState::default();
        Ok(())
    }
}
