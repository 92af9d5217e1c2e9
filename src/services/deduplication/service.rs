//! Batch repair of an already-populated graph.
//!
//! Every pass collects its merge groups first and applies them second, so a
//! pass never acts on a half-merged view of the graph. Only one pass runs at
//! a time in a process.

use crate::models::{Entity, EntityQuery, EntityType};
use crate::services::name_normalizer::{NameNormalizer, canonical_id, fuzzy_title_key};
use crate::storage::traits::graph::GraphBackend;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::instrument;

use super::types::{DuplicateGroup, DuplicateReport, RebuildConfirmation};

/// Serializes migration passes across every migrator in the process.
static MIGRATION_LOCK: Mutex<()> = Mutex::new(());

fn acquire_migration_lock() -> MutexGuard<'static, ()> {
    MIGRATION_LOCK.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Migration lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Idempotent deduplication passes over a graph backend.
///
/// # Example
///
/// ```rust,ignore
/// use manga_graph::services::DeduplicationMigrator;
/// use manga_graph::models::EntityType;
///
/// let migrator = DeduplicationMigrator::new(backend);
/// migrator.renormalize_names(EntityType::Author)?;
/// let merged = migrator.merge_duplicates(EntityType::Author)?;
/// assert_eq!(migrator.merge_duplicates(EntityType::Author)?, 0);
/// ```
pub struct DeduplicationMigrator<B: GraphBackend> {
    backend: Arc<B>,
    normalizer: NameNormalizer,
}

impl<B: GraphBackend> DeduplicationMigrator<B> {
    /// Creates a new migrator with the given backend.
    pub fn new(backend: B) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Creates a new migrator with a shared backend.
    #[must_use]
    pub fn with_shared_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            normalizer: NameNormalizer::new(),
        }
    }

    /// Replaces the name normalizer used by [`Self::renormalize_names`].
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: NameNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Returns a reference to the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reports nodes of `entity_type` sharing a display name. Read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    #[instrument(skip(self))]
    pub fn find_duplicates(&self, entity_type: EntityType) -> Result<DuplicateReport> {
        Ok(DuplicateReport {
            entity_type,
            groups: self.collect_groups(entity_type)?,
        })
    }

    /// Merges nodes of `entity_type` that share a display name exactly.
    ///
    /// In each group the node whose id is the canonical id of the shared
    /// name survives, so later imports keep writing to it; failing that,
    /// the node with the lowest insertion sequence. Incident relationships
    /// are re-pointed onto the survivor and the others are deleted. Returns
    /// the number of nodes deleted, so a second run returns 0.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails. Groups merged before
    /// the failure stay merged.
    #[instrument(skip(self))]
    pub fn merge_duplicates(&self, entity_type: EntityType) -> Result<usize> {
        let _guard = acquire_migration_lock();
        let start = Instant::now();

        let groups = self.collect_groups(entity_type)?;
        let mut deleted = 0;
        for group in &groups {
            self.backend.merge_entities(&group.survivor, &group.duplicates)?;
            tracing::debug!(
                name = %group.name,
                survivor = %group.survivor,
                merged = group.duplicates.len(),
                "Merged duplicate group"
            );
            deleted += group.duplicates.len();
        }

        metrics::counter!("graph_dedup_nodes_merged_total", "type" => entity_type.as_str())
            .increment(deleted as u64);
        tracing::info!(
            entity_type = %entity_type,
            groups = groups.len(),
            deleted,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Duplicate merge pass complete"
        );
        Ok(deleted)
    }

    /// Merges Work nodes whose titles are spelling variants of
    /// `canonical_title`.
    ///
    /// Titles match when they are equal after removing whitespace and
    /// folding width and case. The survivor is the oldest node titled exactly
    /// `canonical_title`, else the oldest match, and is renamed to
    /// `canonical_title`. Returns the number of nodes deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank title, or an error if a
    /// storage operation fails.
    #[instrument(skip(self))]
    pub fn merge_title_variants(&self, canonical_title: &str) -> Result<usize> {
        let canonical_title = canonical_title.trim();
        let target = fuzzy_title_key(canonical_title);
        if target.is_empty() {
            return Err(Error::InvalidInput("canonical title is blank".to_string()));
        }

        let _guard = acquire_migration_lock();

        let variants: Vec<Entity> = self
            .backend
            .query_entities(&EntityQuery::new().with_type(EntityType::Work))?
            .into_iter()
            .filter(|work| fuzzy_title_key(&work.name) == target)
            .collect();

        let Some(survivor) = variants
            .iter()
            .find(|work| work.name == canonical_title)
            .or_else(|| variants.first())
        else {
            return Ok(0);
        };

        let others: Vec<_> = variants
            .iter()
            .filter(|work| work.id != survivor.id)
            .map(|work| work.id.clone())
            .collect();
        if !others.is_empty() {
            self.backend.merge_entities(&survivor.id, &others)?;
        }
        if survivor.name != canonical_title {
            self.backend.rename_entity(&survivor.id, canonical_title)?;
        }

        metrics::counter!("graph_dedup_nodes_merged_total", "type" => EntityType::Work.as_str())
            .increment(others.len() as u64);
        tracing::info!(
            title = canonical_title,
            survivor = %survivor.id,
            deleted = others.len(),
            "Title variant merge complete"
        );
        Ok(others.len())
    }

    /// Re-applies the current normalization rules to stored display names.
    ///
    /// Applies to Author (creator rules) and Publisher (publisher rules)
    /// nodes. Ids are not changed; run [`Self::merge_duplicates`] afterwards
    /// to collapse nodes that now share a name. Returns the number of nodes
    /// renamed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for Work and Magazine, or an error if
    /// a storage operation fails.
    #[instrument(skip(self))]
    pub fn renormalize_names(&self, entity_type: EntityType) -> Result<usize> {
        let normalize: fn(&NameNormalizer, &str) -> String = match entity_type {
            EntityType::Author => NameNormalizer::normalize_creator_name,
            EntityType::Publisher => NameNormalizer::normalize_publisher_name,
            EntityType::Magazine | EntityType::Work => {
                return Err(Error::InvalidInput(format!(
                    "no normalization rules for {entity_type} names"
                )));
            },
        };

        let _guard = acquire_migration_lock();

        // Collect, then apply
        let renames: Vec<_> = self
            .backend
            .query_entities(&EntityQuery::new().with_type(entity_type))?
            .into_iter()
            .filter_map(|entity| {
                let normalized = normalize(&self.normalizer, &entity.name);
                (!normalized.is_empty() && normalized != entity.name)
                    .then_some((entity.id, normalized))
            })
            .collect();

        for (id, name) in &renames {
            self.backend.rename_entity(id, name)?;
        }

        tracing::info!(entity_type = %entity_type, renamed = renames.len(), "Name renormalization complete");
        Ok(renames.len())
    }

    /// Clears the whole graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfirmationRequired`] unless `confirmation` is
    /// [`RebuildConfirmation::Confirmed`], or an error if the clear fails.
    pub fn rebuild(&self, confirmation: RebuildConfirmation) -> Result<()> {
        self.rebuild_then(confirmation, || Ok(()))
    }

    /// Clears the whole graph, then runs `reimport` before any other pass
    /// can start.
    ///
    /// Nothing is cleared when confirmation is missing. If `reimport` fails
    /// the graph holds whatever it wrote before the failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfirmationRequired`] unless `confirmation` is
    /// [`RebuildConfirmation::Confirmed`], an error if the clear fails, or
    /// the error `reimport` returns.
    #[instrument(skip(self, reimport))]
    pub fn rebuild_then<T, E>(
        &self,
        confirmation: RebuildConfirmation,
        reimport: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        if confirmation != RebuildConfirmation::Confirmed {
            return Err(Error::ConfirmationRequired(
                "rebuild deletes every entity and relationship".to_string(),
            )
            .into());
        }

        let _guard = acquire_migration_lock();
        self.backend.clear()?;
        tracing::warn!("Graph cleared for rebuild");
        reimport()
    }

    /// Groups nodes by exact display name, keeping groups of two or more.
    fn collect_groups(&self, entity_type: EntityType) -> Result<Vec<DuplicateGroup>> {
        let entities = self
            .backend
            .query_entities(&EntityQuery::new().with_type(entity_type))?;

        let mut by_name: HashMap<&str, Vec<&Entity>> = HashMap::new();
        for entity in &entities {
            by_name.entry(entity.name.as_str()).or_default().push(entity);
        }

        let mut groups: Vec<(u64, DuplicateGroup)> = by_name
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(name, mut members)| {
                members.sort_by_key(|e| e.sequence);
                // Work ids come from source records, not names
                let canonical = match entity_type {
                    EntityType::Work => None,
                    _ => canonical_id(name, entity_type),
                };
                let position = members
                    .iter()
                    .position(|e| Some(&e.id) == canonical.as_ref())
                    .unwrap_or(0);
                let survivor = members.remove(position);
                let group = DuplicateGroup {
                    entity_type,
                    name: name.to_string(),
                    survivor: survivor.id.clone(),
                    duplicates: members.iter().map(|e| e.id.clone()).collect(),
                };
                (survivor.sequence, group)
            })
            .collect();

        groups.sort_by_key(|(sequence, _)| *sequence);
        Ok(groups.into_iter().map(|(_, group)| group).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, Relationship, RelationshipQuery, RelationshipType};
    use crate::storage::InMemoryGraphBackend;

    fn seed(backend: &InMemoryGraphBackend, id: &str, entity_type: EntityType, name: &str) {
        backend
            .upsert_entity(&Entity::new(EntityId::new(id), entity_type, name))
            .unwrap();
    }

    fn link(backend: &InMemoryGraphBackend, from: &str, to: &str, t: RelationshipType) {
        backend
            .upsert_relationship(&Relationship::new(EntityId::new(from), EntityId::new(to), t))
            .unwrap();
    }

    /// Two legacy author nodes for one person, one of them prefixed.
    fn legacy_graph() -> InMemoryGraphBackend {
        let backend = InMemoryGraphBackend::new();
        seed(&backend, "author_old1", EntityType::Author, "尾田栄一郎");
        seed(&backend, "author_old2", EntityType::Author, "[著]尾田栄一郎");
        seed(&backend, "author_old3", EntityType::Author, "尾田栄一郎");
        seed(&backend, "work_1", EntityType::Work, "ONE PIECE 1");
        seed(&backend, "work_2", EntityType::Work, "ONE PIECE 2");
        link(&backend, "author_old1", "work_1", RelationshipType::Created);
        link(&backend, "author_old2", "work_2", RelationshipType::Created);
        link(&backend, "author_old3", "work_1", RelationshipType::Created);
        backend
    }

    #[test]
    fn test_find_duplicates_is_read_only() {
        let migrator = DeduplicationMigrator::new(legacy_graph());
        let report = migrator.find_duplicates(EntityType::Author).unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].survivor.as_str(), "author_old1");
        assert_eq!(report.duplicate_count(), 1);
        assert_eq!(
            migrator.backend().get_stats().unwrap().entities_of(EntityType::Author),
            3
        );
    }

    #[test]
    fn test_merge_duplicates_keeps_oldest_and_is_idempotent() {
        let migrator = DeduplicationMigrator::new(legacy_graph());

        assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 1);
        assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 0);

        let backend = migrator.backend();
        assert!(backend.get_entity(&EntityId::new("author_old3")).unwrap().is_none());
        let edges = backend
            .query_relationships(&RelationshipQuery::new().from(EntityId::new("author_old1")))
            .unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_renormalize_then_merge() {
        let migrator = DeduplicationMigrator::new(legacy_graph());

        assert_eq!(migrator.renormalize_names(EntityType::Author).unwrap(), 1);
        assert_eq!(migrator.renormalize_names(EntityType::Author).unwrap(), 0);
        assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 2);

        let stats = migrator.backend().get_stats().unwrap();
        assert_eq!(stats.entities_of(EntityType::Author), 1);
        assert_eq!(stats.relationships_of(RelationshipType::Created), 2);
    }

    #[test]
    fn test_merge_prefers_canonical_id_survivor() {
        let backend = InMemoryGraphBackend::new();
        let canonical = canonical_id("尾田栄一郎", EntityType::Author).unwrap();
        seed(&backend, "author_legacy", EntityType::Author, "尾田栄一郎");
        seed(&backend, canonical.as_str(), EntityType::Author, "尾田栄一郎");
        seed(&backend, "work_1", EntityType::Work, "ONE PIECE 1");
        link(&backend, "author_legacy", "work_1", RelationshipType::Created);

        let migrator = DeduplicationMigrator::new(backend);
        let report = migrator.find_duplicates(EntityType::Author).unwrap();
        assert_eq!(report.groups[0].survivor, canonical);
        assert_eq!(report.groups[0].duplicates, vec![EntityId::new("author_legacy")]);

        assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 1);
        let edges = migrator
            .backend()
            .query_relationships(&RelationshipQuery::new().from(canonical))
            .unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_renormalize_rejects_works() {
        let migrator = DeduplicationMigrator::new(InMemoryGraphBackend::new());
        assert!(matches!(
            migrator.renormalize_names(EntityType::Work),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_merge_title_variants() {
        let backend = InMemoryGraphBackend::new();
        seed(&backend, "work_a", EntityType::Work, "One Piece");
        seed(&backend, "work_b", EntityType::Work, "ONE PIECE");
        seed(&backend, "work_c", EntityType::Work, "ＯＮＥ　ＰＩＥＣＥ");
        seed(&backend, "work_d", EntityType::Work, "ONE PUNCH-MAN");
        seed(&backend, "magazine_j", EntityType::Magazine, "週刊少年ジャンプ");
        link(&backend, "magazine_j", "work_a", RelationshipType::Contains);
        link(&backend, "magazine_j", "work_c", RelationshipType::Contains);

        let migrator = DeduplicationMigrator::new(backend);
        assert_eq!(migrator.merge_title_variants("ONE PIECE").unwrap(), 2);
        assert_eq!(migrator.merge_title_variants("ONE PIECE").unwrap(), 0);

        let backend = migrator.backend();
        let survivor = backend.get_entity(&EntityId::new("work_b")).unwrap().unwrap();
        assert_eq!(survivor.name, "ONE PIECE");
        assert!(backend.get_entity(&EntityId::new("work_d")).unwrap().is_some());
        assert_eq!(
            backend.get_stats().unwrap().relationships_of(RelationshipType::Contains),
            1
        );
    }

    #[test]
    fn test_merge_title_variants_renames_without_exact_match() {
        let backend = InMemoryGraphBackend::new();
        seed(&backend, "work_a", EntityType::Work, "One Piece");
        seed(&backend, "work_b", EntityType::Work, "one piece");

        let migrator = DeduplicationMigrator::new(backend);
        assert_eq!(migrator.merge_title_variants("ONE PIECE").unwrap(), 1);
        let survivor = migrator
            .backend()
            .get_entity(&EntityId::new("work_a"))
            .unwrap()
            .unwrap();
        assert_eq!(survivor.name, "ONE PIECE");
        assert!(matches!(
            migrator.merge_title_variants("  "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rebuild_then_reimports_into_empty_graph() {
        let migrator = DeduplicationMigrator::new(legacy_graph());

        let mut called = false;
        let result: Result<()> = migrator.rebuild_then(RebuildConfirmation::Unconfirmed, || {
            called = true;
            Ok(())
        });
        assert!(matches!(result, Err(Error::ConfirmationRequired(_))));
        assert!(!called);

        let count = migrator
            .rebuild_then(RebuildConfirmation::Confirmed, || {
                seed(migrator.backend(), "author_new", EntityType::Author, "尾田栄一郎");
                migrator.backend().get_stats().map(|stats| stats.entity_count)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rebuild_requires_confirmation() {
        let migrator = DeduplicationMigrator::new(legacy_graph());
        assert!(matches!(
            migrator.rebuild(RebuildConfirmation::Unconfirmed),
            Err(Error::ConfirmationRequired(_))
        ));
        assert_eq!(migrator.backend().get_stats().unwrap().entity_count, 5);

        migrator.rebuild(RebuildConfirmation::from_flag(true)).unwrap();
        assert_eq!(migrator.backend().get_stats().unwrap().entity_count, 0);
    }
}
