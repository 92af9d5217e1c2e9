//! Graph backend trait for the bibliographic graph.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Notes |
//! |---------|----------|-------|
//! | `SqliteGraphBackend` | Default; embedded | `ON CONFLICT` upserts, transactional merges |
//! | `InMemoryGraphBackend` | Testing | Single `RwLock` over the whole graph |
//!
//! # Merge-on-write
//!
//! Every write is a merge primitive: [`GraphBackend::upsert_entity`] never
//! creates a second node for an id already present, and
//! [`GraphBackend::upsert_relationship`] never creates a second edge for a
//! `(from, type, to)` triple already present. Each call is atomic, so
//! concurrent ingestion workers sharing one backend cannot race two nodes
//! into existence for one id.
//!
//! # Example
//!
//! ```rust,ignore
//! use manga_graph::storage::GraphBackend;
//! use manga_graph::models::{EntityQuery, EntityType};
//!
//! let authors = backend.query_entities(
//!     &EntityQuery::new().with_type(EntityType::Author).with_limit(20),
//! )?;
//! ```

use crate::Result;
use crate::models::{
    Entity, EntityId, EntityQuery, EntityType, Relationship, RelationshipQuery, RelationshipType,
};
use std::collections::BTreeMap;

/// Result of an entity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entity had this id; one was created.
    Created,
    /// The entity existed and its name or properties changed.
    Updated,
    /// The entity existed and nothing changed.
    Unchanged,
}

impl UpsertOutcome {
    /// Returns true if a new entity was created.
    #[must_use]
    pub const fn is_created(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Trait for graph storage backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn GraphBackend>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
/// - Each method must be atomic with respect to every other method
/// - Entities absorbed by a merge leave no dangling relationships
/// - Entity and relationship listings are ordered by insertion
pub trait GraphBackend: Send + Sync {
    // ========================================================================
    // Entity Operations
    // ========================================================================

    /// Merge-upserts an entity by id.
    ///
    /// If absent, the entity is created and assigned the next insertion
    /// sequence. If present, identity and `original_name` are kept, the
    /// display name is replaced by `entity.name`, and properties whose keys
    /// are not yet stored are added (stored values win).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn upsert_entity(&self, entity: &Entity) -> Result<UpsertOutcome>;

    /// Retrieves an entity by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>>;

    /// Queries entities, ordered by insertion sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>>;

    /// Replaces an entity's display name.
    ///
    /// Returns `false` if the entity does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn rename_entity(&self, id: &EntityId, name: &str) -> Result<bool>;

    /// Folds `others` into `survivor`, atomically.
    ///
    /// Every relationship incident on an absorbed entity is re-pointed onto
    /// the survivor with merge semantics: a triple the survivor already has is
    /// not duplicated and self-loops are dropped. Properties are unioned onto
    /// the survivor (survivor values win) and absorbed entities are deleted.
    /// Ids in `others` that are not stored, or equal `survivor`, are ignored.
    ///
    /// Returns the survivor as stored after the merge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the survivor does not exist,
    /// or an error if the storage operation fails.
    fn merge_entities(&self, survivor: &EntityId, others: &[EntityId]) -> Result<Entity>;

    // ========================================================================
    // Relationship Operations
    // ========================================================================

    /// Merge-upserts a relationship by its `(from, type, to)` triple.
    ///
    /// Returns `true` if the relationship was created, `false` if the triple
    /// already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing or the storage
    /// operation fails.
    fn upsert_relationship(&self, relationship: &Relationship) -> Result<bool>;

    /// Queries relationships, ordered by insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn query_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Utility Operations
    // ========================================================================

    /// Returns statistics about the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    fn get_stats(&self) -> Result<GraphStats>;

    /// Clears all graph data.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    fn clear(&self) -> Result<()>;
}

/// Statistics about the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Total number of entities.
    pub entity_count: usize,
    /// Number of entities by type.
    pub entities_by_type: BTreeMap<EntityType, usize>,
    /// Total number of relationships.
    pub relationship_count: usize,
    /// Number of relationships by type.
    pub relationships_by_type: BTreeMap<RelationshipType, usize>,
}

impl GraphStats {
    /// Creates empty stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity count for one type.
    #[must_use]
    pub fn entities_of(&self, entity_type: EntityType) -> usize {
        self.entities_by_type.get(&entity_type).copied().unwrap_or(0)
    }

    /// Returns the relationship count for one type.
    #[must_use]
    pub fn relationships_of(&self, relationship_type: RelationshipType) -> usize {
        self.relationships_by_type
            .get(&relationship_type)
            .copied()
            .unwrap_or(0)
    }
}
