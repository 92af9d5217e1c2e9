//! Merge-on-write ingestion of source records into the graph.
//!
//! Every record is turned into a Work (or Magazine) node plus the Author,
//! Publisher and Magazine nodes its fields mention. Names go through
//! [`NameNormalizer`] so spelling variants land on one node, and every write
//! is a backend merge-upsert, so re-importing a file changes nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use manga_graph::services::GraphIngestor;
//! use manga_graph::storage::InMemoryGraphBackend;
//!
//! let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
//! let report = ingestor.ingest(&records)?;
//! println!("{} works, {} skipped", report.works_ingested, report.skipped());
//! ```

use crate::models::{
    CatalogRecord, Entity, EntityId, EntityQuery, EntityType, MediaArtsRecord, PropertyValue,
    RecordKind, Relationship, RelationshipType, SourceRecord,
};
use crate::services::magazine_extractor::MagazineExtractor;
use crate::services::name_normalizer::{NameNormalizer, canonical_id};
use crate::services::name_registry::NameRegistry;
use crate::storage::traits::graph::{GraphBackend, UpsertOutcome};
use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::instrument;

/// Number of independently locked name-registry shards.
const REGISTRY_SHARDS: usize = 16;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records offered to the ingestor.
    pub records_seen: usize,
    /// Work records stored (books, series and catalog titles).
    pub works_ingested: usize,
    /// Magazine records stored.
    pub magazines_ingested: usize,
    /// Records of a type the graph does not model.
    pub skipped_unrecognized: usize,
    /// Records missing their title.
    pub skipped_malformed: usize,
    /// Names that normalized to nothing and were not stored.
    pub degenerate_names: usize,
    /// Entities newly created.
    pub entities_created: usize,
    /// Existing entities whose name or properties changed.
    pub entities_updated: usize,
    /// Relationships newly created.
    pub relationships_created: usize,
}

impl IngestReport {
    /// Total records skipped for any reason.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped_unrecognized + self.skipped_malformed
    }

    /// Adds another report's counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.records_seen += other.records_seen;
        self.works_ingested += other.works_ingested;
        self.magazines_ingested += other.magazines_ingested;
        self.skipped_unrecognized += other.skipped_unrecognized;
        self.skipped_malformed += other.skipped_malformed;
        self.degenerate_names += other.degenerate_names;
        self.entities_created += other.entities_created;
        self.entities_updated += other.entities_updated;
        self.relationships_created += other.relationships_created;
    }

    const fn record_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.entities_created += 1,
            UpsertOutcome::Updated => self.entities_updated += 1,
            UpsertOutcome::Unchanged => {},
        }
    }
}

/// Loads normalized records into a graph backend.
///
/// # Thread Safety
///
/// The ingestor is `Sync`; [`Self::ingest_concurrent`] shares one instance
/// across worker threads. Display-name choices go through a session
/// [`NameRegistry`] split into shards by canonical id. A shard's mutex is
/// held across the matching lookup and upsert, so a lower-ranked spelling
/// can never overwrite a higher-ranked one, while names in other shards are
/// written in parallel.
pub struct GraphIngestor<B: GraphBackend> {
    backend: Arc<B>,
    normalizer: NameNormalizer,
    extractor: MagazineExtractor,
    registry: Vec<Mutex<NameRegistry>>,
}

impl<B: GraphBackend> GraphIngestor<B> {
    /// Creates a new ingestor with the given backend.
    pub fn new(backend: B) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Creates a new ingestor with a shared backend.
    #[must_use]
    pub fn with_shared_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            normalizer: NameNormalizer::new(),
            extractor: MagazineExtractor::new(),
            registry: (0..REGISTRY_SHARDS)
                .map(|_| Mutex::new(NameRegistry::new()))
                .collect(),
        }
    }

    /// Replaces the name normalizer.
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

    /// Ingests a batch of records.
    ///
    /// Unrecognized and malformed records are skipped and counted; they
    /// never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    #[instrument(skip(self, records))]
    pub fn ingest<'a>(&self, records: impl IntoIterator<Item = &'a SourceRecord>) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        for record in records {
            report.merge(&self.ingest_record(record)?);
        }

        tracing::info!(
            records = report.records_seen,
            works = report.works_ingested,
            magazines = report.magazines_ingested,
            skipped = report.skipped(),
            entities_created = report.entities_created,
            relationships_created = report.relationships_created,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Ingested batch"
        );
        Ok(report)
    }

    /// Ingests a batch across `workers` threads sharing this ingestor.
    ///
    /// Records are split into contiguous chunks, one per worker. Merge-upserts
    /// are atomic in the backend, so concurrent workers never create two
    /// nodes for one id.
    ///
    /// # Errors
    ///
    /// Returns the first storage error any worker hits, or
    /// [`Error::OperationFailed`] if a worker panics.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn ingest_concurrent(&self, records: &[SourceRecord], workers: usize) -> Result<IngestReport> {
        let workers = workers.clamp(1, records.len().max(1));
        if workers == 1 {
            return self.ingest(records);
        }

        let chunk_size = records.len().div_ceil(workers);
        let results: Vec<Result<IngestReport>> = std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.ingest(chunk)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::OperationFailed {
                            operation: "ingest_worker".to_string(),
                            cause: "worker thread panicked".to_string(),
                        })
                    })
                })
                .collect()
        });

        let mut report = IngestReport::default();
        for result in results {
            report.merge(&result?);
        }
        Ok(report)
    }

    /// Ingests a single record.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    #[instrument(skip(self, record), fields(source = record.source_tag(), source_id = record.source_id()))]
    pub fn ingest_record(&self, record: &SourceRecord) -> Result<IngestReport> {
        let mut report = IngestReport {
            records_seen: 1,
            ..IngestReport::default()
        };

        match record {
            SourceRecord::MediaArts(item) => self.ingest_media_arts(item, &mut report)?,
            SourceRecord::Catalog(row) => self.ingest_catalog(row, &mut report)?,
        }

        let status = if report.skipped_unrecognized > 0 {
            "unrecognized"
        } else if report.skipped_malformed > 0 {
            "malformed"
        } else {
            "ingested"
        };
        metrics::counter!(
            "graph_ingest_records_total",
            "source" => record.source_tag(),
            "status" => status
        )
        .increment(1);

        Ok(report)
    }

    fn ingest_media_arts(&self, item: &MediaArtsRecord, report: &mut IngestReport) -> Result<()> {
        const SOURCE: &str = "media_arts";

        let Some(kind) = item.classify() else {
            tracing::debug!(types = ?item.types, genre = ?item.genre, "Skipping unrecognized record");
            report.skipped_unrecognized += 1;
            return Ok(());
        };
        let Some(title) = item.title.as_deref() else {
            tracing::debug!(source_id = ?item.source_id, "Skipping record without title");
            report.skipped_malformed += 1;
            return Ok(());
        };

        if kind == RecordKind::Magazine {
            let publisher = item
                .publisher
                .as_deref()
                .map(|p| self.normalizer.normalize_publisher_name(p))
                .filter(|p| !p.is_empty());
            let magazine = self.upsert_named(
                EntityType::Magazine,
                title,
                title,
                |entity| {
                    entity
                        .with_property("source", SOURCE)
                        .with_optional_property("source_id", item.source_id.as_deref())
                        .with_optional_property("publisher", publisher)
                        .with_optional_property(
                            "established_date",
                            item.date_published.as_deref().map(PropertyValue::parse_date),
                        )
                },
                report,
            )?;
            if magazine.is_some() {
                report.magazines_ingested += 1;
            }
            return Ok(());
        }

        let Some(work_id) = work_id(SOURCE, item.source_id.as_deref(), title) else {
            report.skipped_malformed += 1;
            return Ok(());
        };
        let work = Entity::new(work_id.clone(), EntityType::Work, title)
            .with_property("source", SOURCE)
            .with_property("kind", kind.as_str())
            .with_optional_property("source_id", item.source_id.as_deref())
            .with_optional_property("genre", item.genre.as_deref())
            .with_optional_property("description", item.description.as_deref())
            .with_optional_property("isbn", item.isbn.as_deref())
            .with_optional_property("volume", item.volume.as_deref().map(volume_value))
            .with_optional_property(
                "publication_date",
                item.date_published.as_deref().map(PropertyValue::parse_date),
            );
        report.record_upsert(self.backend.upsert_entity(&work)?);
        report.works_ingested += 1;

        for raw in &item.creators {
            for name in self.normalizer.normalize_creator_field(raw) {
                let author = self.upsert_named(EntityType::Author, &name, raw, |e| e, report)?;
                if let Some(author) = author {
                    self.link(author, work_id.clone(), RelationshipType::Created, report)?;
                }
            }
        }

        if let Some(raw) = item.publisher.as_deref() {
            let name = self.normalizer.normalize_publisher_name(raw);
            let publisher = self.upsert_named(EntityType::Publisher, &name, raw, |e| e, report)?;
            if let Some(publisher) = publisher {
                self.link(publisher, work_id.clone(), RelationshipType::Published, report)?;
            }
        }

        if let Some(description) = item.description.as_deref() {
            for name in self.extractor.extract_magazines(description) {
                let magazine = self.upsert_named(EntityType::Magazine, &name, &name, |e| e, report)?;
                if let Some(magazine) = magazine {
                    self.link(magazine, work_id.clone(), RelationshipType::Contains, report)?;
                }
            }
        }

        Ok(())
    }

    fn ingest_catalog(&self, row: &CatalogRecord, report: &mut IngestReport) -> Result<()> {
        const SOURCE: &str = "catalog";

        let Some(title) = row.title.as_deref().or(row.english_title.as_deref()) else {
            tracing::debug!(source_id = ?row.source_id, "Skipping catalog row without title");
            report.skipped_malformed += 1;
            return Ok(());
        };
        let Some(work_id) = work_id(SOURCE, row.source_id.as_deref(), title) else {
            report.skipped_malformed += 1;
            return Ok(());
        };

        let english_title = row.english_title.as_deref().filter(|t| *t != title);
        let work = Entity::new(work_id.clone(), EntityType::Work, title)
            .with_property("source", SOURCE)
            .with_property("kind", RecordKind::Work.as_str())
            .with_optional_property("source_id", row.source_id.as_deref())
            .with_optional_property("english_title", english_title);
        report.record_upsert(self.backend.upsert_entity(&work)?);
        report.works_ingested += 1;

        for raw in &row.authors {
            let name = self.normalizer.normalize_catalog_author(raw);
            if let Some(author) = self.upsert_named(EntityType::Author, &name, raw, |e| e, report)? {
                self.link(author, work_id.clone(), RelationshipType::Created, report)?;
            }
        }

        for raw in &row.serialization {
            let name = raw.trim();
            if let Some(magazine) = self.upsert_named(EntityType::Magazine, name, raw, |e| e, report)? {
                self.link(work_id.clone(), magazine, RelationshipType::PublishedIn, report)?;
            }
        }

        Ok(())
    }

    /// Merge-upserts an Author, Publisher or Magazine by canonical id.
    ///
    /// A node stored under another id with the same type and display name
    /// (left by a legacy import and kept by a dedup pass) absorbs the write
    /// instead, so the graph never grows a second node for that name.
    ///
    /// Returns the id written to, or `None` for names that normalize to
    /// nothing.
    fn upsert_named(
        &self,
        entity_type: EntityType,
        name: &str,
        original: &str,
        decorate: impl FnOnce(Entity) -> Entity,
        report: &mut IngestReport,
    ) -> Result<Option<EntityId>> {
        let Some(id) = canonical_id(name, entity_type) else {
            tracing::debug!(entity_type = %entity_type, raw = original, "Skipping degenerate name");
            report.degenerate_names += 1;
            return Ok(None);
        };

        let mut registry = self.lock_registry(&id);
        if !registry.contains(id.as_str()) {
            if let Some(stored) = self.find_stored(&id, entity_type, name)? {
                registry.seed(id.as_str(), Some(stored.id.as_str()), &stored.name);
            }
        }
        let display = registry.offer(id.as_str(), name).to_string();
        let target = registry
            .target(id.as_str())
            .map_or_else(|| id.clone(), EntityId::new);

        let entity = decorate(
            Entity::new(target.clone(), entity_type, display).with_original_name(original.trim()),
        );
        let outcome = self.backend.upsert_entity(&entity)?;
        drop(registry);

        report.record_upsert(outcome);
        Ok(Some(target))
    }

    /// Looks up the node a name resolves to: the canonical id first, then
    /// an exact display-name match of the same type.
    fn find_stored(
        &self,
        id: &EntityId,
        entity_type: EntityType,
        name: &str,
    ) -> Result<Option<Entity>> {
        if let Some(stored) = self.backend.get_entity(id)? {
            return Ok(Some(stored));
        }
        let legacy = self.backend.query_entities(
            &EntityQuery::new()
                .with_type(entity_type)
                .with_name(name)
                .with_limit(1),
        )?;
        if let Some(stored) = legacy.first() {
            tracing::debug!(entity_type = %entity_type, canonical = %id, stored = %stored.id, "Resolved name to legacy node");
        }
        Ok(legacy.into_iter().next())
    }

    fn link(
        &self,
        from: EntityId,
        to: EntityId,
        relationship_type: RelationshipType,
        report: &mut IngestReport,
    ) -> Result<()> {
        if self
            .backend
            .upsert_relationship(&Relationship::new(from, to, relationship_type))?
        {
            report.relationships_created += 1;
        }
        Ok(())
    }

    fn lock_registry(&self, id: &EntityId) -> MutexGuard<'_, NameRegistry> {
        self.registry[registry_shard(id)].lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Name registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Shard holding a key's registry slot. Fixed per id.
fn registry_shard(id: &EntityId) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    usize::try_from(hasher.finish() % REGISTRY_SHARDS as u64).unwrap_or(0)
}

/// Work ids are scoped to the source record when it has an id, so two
/// volumes sharing a title stay distinct; otherwise the title is the key.
fn work_id(source: &str, source_id: Option<&str>, title: &str) -> Option<EntityId> {
    match source_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => canonical_id(&format!("{source}:{id}"), EntityType::Work),
        None => canonical_id(title, EntityType::Work),
    }
}

fn volume_value(raw: &str) -> PropertyValue {
    raw.trim()
        .parse::<i64>()
        .map_or_else(|_| PropertyValue::from(raw.trim()), PropertyValue::Integer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationshipQuery;
    use crate::storage::InMemoryGraphBackend;

    fn book(id: &str, title: &str, creator: &str) -> SourceRecord {
        SourceRecord::MediaArts(MediaArtsRecord {
            source_id: Some(id.to_string()),
            types: vec!["class:MangaBook".to_string()],
            genre: Some("マンガ単行本".to_string()),
            title: Some(title.to_string()),
            creators: vec![creator.to_string()],
            ..MediaArtsRecord::default()
        })
    }

    fn authors(ingestor: &GraphIngestor<InMemoryGraphBackend>) -> Vec<Entity> {
        ingestor
            .backend()
            .query_entities(&EntityQuery::new().with_type(EntityType::Author))
            .unwrap()
    }

    #[test]
    fn test_role_prefix_variants_share_author() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let records = vec![
            book("b1", "ONE PIECE 1", "[著]尾田栄一郎"),
            book("b2", "ONE PIECE 2", "[[著]]尾田栄一郎"),
            book("b3", "ONE PIECE 3", "[原作]尾田栄一郎"),
        ];
        let report = ingestor.ingest(&records).unwrap();

        let authors = authors(&ingestor);
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].name, "尾田栄一郎");
        assert_eq!(authors[0].original_name.as_deref(), Some("[著]尾田栄一郎"));
        assert_eq!(report.works_ingested, 3);
        assert_eq!(report.relationships_created, 3);
    }

    #[test]
    fn test_compound_creators_split() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        ingestor
            .ingest(&[book("b1", "NARUTO 外伝", "岸本斉史, 江坂純")])
            .unwrap();
        let names: Vec<_> = authors(&ingestor).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["岸本斉史", "江坂純"]);
    }

    #[test]
    fn test_publisher_and_magazine_edges() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let record = SourceRecord::MediaArts(MediaArtsRecord {
            source_id: Some("b1".to_string()),
            types: vec!["class:MangaBook".to_string()],
            title: Some("NARUTO 1".to_string()),
            publisher: Some("集英社　∥　シュウエイシャ".to_string()),
            description: Some("初出：「週刊少年ジャンプ」1999年43号".to_string()),
            date_published: Some("2000-03".to_string()),
            ..MediaArtsRecord::default()
        });
        ingestor.ingest_record(&record).unwrap();

        let backend = ingestor.backend();
        let stats = backend.get_stats().unwrap();
        assert_eq!(stats.relationships_of(RelationshipType::Published), 1);
        assert_eq!(stats.relationships_of(RelationshipType::Contains), 1);

        let publisher = backend
            .query_entities(&EntityQuery::new().with_type(EntityType::Publisher))
            .unwrap();
        assert_eq!(publisher[0].name, "集英社");
        assert_eq!(
            publisher[0].original_name.as_deref(),
            Some("集英社　∥　シュウエイシャ")
        );

        let work = backend
            .query_entities(&EntityQuery::new().with_type(EntityType::Work))
            .unwrap();
        assert!(matches!(
            work[0].properties.get("publication_date"),
            Some(PropertyValue::Date(_))
        ));
    }

    #[test]
    fn test_skips_are_counted() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let records = vec![
            SourceRecord::MediaArts(MediaArtsRecord {
                types: vec!["class:Anime".to_string()],
                title: Some("x".to_string()),
                ..MediaArtsRecord::default()
            }),
            SourceRecord::MediaArts(MediaArtsRecord {
                types: vec!["class:MangaBook".to_string()],
                ..MediaArtsRecord::default()
            }),
            book("b1", "ONE PIECE 1", "[著]　"),
        ];
        let report = ingestor.ingest(&records).unwrap();
        assert_eq!(report.records_seen, 3);
        assert_eq!(report.skipped_unrecognized, 1);
        assert_eq!(report.skipped_malformed, 1);
        assert_eq!(report.works_ingested, 1);
        assert!(authors(&ingestor).is_empty());
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let records = vec![
            book("b1", "ONE PIECE 1", "[著]尾田栄一郎"),
            book("b2", "NARUTO 1", "岸本斉史"),
        ];
        ingestor.ingest(&records).unwrap();
        let before = ingestor.backend().get_stats().unwrap();

        let second = ingestor.ingest(&records).unwrap();
        assert_eq!(second.entities_created, 0);
        assert_eq!(second.relationships_created, 0);
        assert_eq!(ingestor.backend().get_stats().unwrap(), before);
    }

    #[test]
    fn test_catalog_row() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let row = SourceRecord::Catalog(CatalogRecord {
            source_id: Some("13".to_string()),
            title: Some("One Piece".to_string()),
            english_title: Some("One Piece".to_string()),
            authors: vec!["Oda, Eiichiro (Story & Art)".to_string()],
            serialization: vec!["Shounen Jump (Weekly)".to_string()],
        });
        let report = ingestor.ingest_record(&row).unwrap();
        assert_eq!(report.relationships_created, 2);

        let names: Vec<_> = authors(&ingestor).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Oda, Eiichiro"]);

        let published_in = ingestor
            .backend()
            .query_relationships(&RelationshipQuery::new().with_type(RelationshipType::PublishedIn))
            .unwrap();
        assert_eq!(published_in.len(), 1);
        assert!(published_in[0].from_entity.as_str().starts_with("work_"));
        assert!(published_in[0].to_entity.as_str().starts_with("magazine_"));
    }

    #[test]
    fn test_display_name_prefers_higher_rank() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let records = vec![
            SourceRecord::MediaArts(MediaArtsRecord {
                source_id: Some("b1".to_string()),
                types: vec!["class:MangaBook".to_string()],
                title: Some("t1".to_string()),
                publisher: Some("ＳＱ".to_string()),
                ..MediaArtsRecord::default()
            }),
            SourceRecord::MediaArts(MediaArtsRecord {
                source_id: Some("b2".to_string()),
                types: vec!["class:MangaBook".to_string()],
                title: Some("t2".to_string()),
                publisher: Some("SQ".to_string()),
                ..MediaArtsRecord::default()
            }),
        ];
        ingestor.ingest(&records).unwrap();

        let publishers = ingestor
            .backend()
            .query_entities(&EntityQuery::new().with_type(EntityType::Publisher))
            .unwrap();
        assert_eq!(publishers.len(), 1);
        // Full-width "ＳＱ" is not ASCII, so the Latin spelling outranks it
        assert_eq!(publishers[0].name, "SQ");
    }

    #[test]
    fn test_concurrent_ingest_single_node_per_id() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let records: Vec<_> = (0..40)
            .map(|i| book(&format!("b{i}"), &format!("ONE PIECE {i}"), "[著]尾田栄一郎"))
            .collect();
        let report = ingestor.ingest_concurrent(&records, 4).unwrap();

        assert_eq!(report.records_seen, 40);
        assert_eq!(authors(&ingestor).len(), 1);
        assert_eq!(
            ingestor
                .backend()
                .get_stats()
                .unwrap()
                .relationships_of(RelationshipType::Created),
            40
        );
    }

    #[test]
    fn test_registry_lock_is_per_shard() {
        let ingestor = GraphIngestor::new(InMemoryGraphBackend::new());
        let held = EntityId::new("author_held");
        let other = (0..100)
            .map(|i| EntityId::new(format!("author_{i}")))
            .find(|id| registry_shard(id) != registry_shard(&held))
            .unwrap();
        assert_eq!(registry_shard(&held), registry_shard(&EntityId::new("author_held")));

        let _guard = ingestor.lock_registry(&held);
        assert!(ingestor.registry[registry_shard(&other)].try_lock().is_ok());
        assert!(ingestor.registry[registry_shard(&held)].try_lock().is_err());
    }
}
