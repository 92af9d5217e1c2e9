//! Deduplication integration tests.
//!
//! Seeds a `SQLite` graph with the duplicates a legacy import left behind and
//! repairs it with the migrator passes.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use manga_graph::models::{
    Entity, EntityId, EntityQuery, EntityType, MediaArtsRecord, Relationship, RelationshipQuery,
    RelationshipType, SourceRecord,
};
use manga_graph::services::name_normalizer::canonical_id;
use manga_graph::services::{DeduplicationMigrator, GraphIngestor, RebuildConfirmation};
use manga_graph::storage::{GraphBackend, SqliteGraphBackend};
use manga_graph::Error;
use std::sync::Arc;
use tempfile::TempDir;

fn create_backend(temp_dir: &TempDir) -> Arc<SqliteGraphBackend> {
    let path = temp_dir.path().join("legacy_graph.db");
    Arc::new(SqliteGraphBackend::new(&path).expect("Failed to create graph backend"))
}

fn seed(backend: &SqliteGraphBackend, id: &str, entity_type: EntityType, name: &str) {
    backend
        .upsert_entity(&Entity::new(EntityId::new(id), entity_type, name))
        .unwrap();
}

fn link(backend: &SqliteGraphBackend, from: &str, to: &str, relationship_type: RelationshipType) {
    backend
        .upsert_relationship(&Relationship::new(
            EntityId::new(from),
            EntityId::new(to),
            relationship_type,
        ))
        .unwrap();
}

/// Three author nodes for one person, each credited on its own volume.
fn legacy_graph(backend: &SqliteGraphBackend) {
    seed(backend, "legacy_oda_1", EntityType::Author, "[著]尾田栄一郎");
    seed(backend, "legacy_oda_2", EntityType::Author, "尾田栄一郎");
    seed(backend, "legacy_oda_3", EntityType::Author, "[[原作]]尾田栄一郎");
    for i in 1..=3 {
        seed(backend, &format!("work_{i}"), EntityType::Work, &format!("ONE PIECE {i}"));
        link(backend, &format!("legacy_oda_{i}"), &format!("work_{i}"), RelationshipType::Created);
    }
}

#[test]
fn test_renormalize_then_merge() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    legacy_graph(&backend);
    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));

    assert!(migrator.find_duplicates(EntityType::Author).unwrap().is_clean());
    assert_eq!(migrator.renormalize_names(EntityType::Author).unwrap(), 2);

    let report = migrator.find_duplicates(EntityType::Author).unwrap();
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].survivor, EntityId::new("legacy_oda_1"));
    assert_eq!(report.duplicate_count(), 2);

    assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 2);

    let authors = backend
        .query_entities(&EntityQuery::new().with_type(EntityType::Author))
        .unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].id, EntityId::new("legacy_oda_1"));

    let created = backend
        .query_relationships(
            &RelationshipQuery::new()
                .from(EntityId::new("legacy_oda_1"))
                .with_type(RelationshipType::Created),
        )
        .unwrap();
    assert_eq!(created.len(), 3);
}

fn book(id: &str, title: &str, creator: &str) -> SourceRecord {
    SourceRecord::MediaArts(MediaArtsRecord {
        source_id: Some(id.to_string()),
        types: vec!["class:MangaBook".to_string()],
        title: Some(title.to_string()),
        creators: vec![creator.to_string()],
        ..Default::default()
    })
}

fn author_ids(backend: &SqliteGraphBackend) -> Vec<EntityId> {
    backend
        .query_entities(&EntityQuery::new().with_type(EntityType::Author))
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect()
}

#[test]
fn test_reimport_after_merge_keeps_canonical_node() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);

    // Legacy node keyed on the unnormalized spelling
    let legacy = canonical_id("[著]尾田栄一郎", EntityType::Author).unwrap();
    seed(&backend, legacy.as_str(), EntityType::Author, "[著]尾田栄一郎");
    GraphIngestor::with_shared_backend(Arc::clone(&backend))
        .ingest(&[book("M1", "ONE PIECE 1", "尾田栄一郎")])
        .unwrap();

    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));
    assert_eq!(migrator.renormalize_names(EntityType::Author).unwrap(), 1);
    assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 1);

    let canonical = canonical_id("尾田栄一郎", EntityType::Author).unwrap();
    assert_eq!(author_ids(&backend), vec![canonical.clone()]);

    GraphIngestor::with_shared_backend(Arc::clone(&backend))
        .ingest(&[book("M2", "ONE PIECE 2", "[著]尾田栄一郎")])
        .unwrap();
    assert_eq!(author_ids(&backend), vec![canonical.clone()]);

    let created = backend
        .query_relationships(&RelationshipQuery::new().from(canonical))
        .unwrap();
    assert_eq!(created.len(), 2);
}

#[test]
fn test_reimport_after_merge_reuses_legacy_survivor() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    legacy_graph(&backend);

    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));
    migrator.renormalize_names(EntityType::Author).unwrap();
    migrator.merge_duplicates(EntityType::Author).unwrap();

    let report = GraphIngestor::with_shared_backend(Arc::clone(&backend))
        .ingest(&[book("M4", "ONE PIECE 4", "[著]尾田栄一郎")])
        .unwrap();
    assert_eq!(report.entities_created, 1);
    assert_eq!(author_ids(&backend), vec![EntityId::new("legacy_oda_1")]);

    let created = backend
        .query_relationships(
            &RelationshipQuery::new()
                .from(EntityId::new("legacy_oda_1"))
                .with_type(RelationshipType::Created),
        )
        .unwrap();
    assert_eq!(created.len(), 4);
    assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 0);
}

#[test]
fn test_passes_are_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    legacy_graph(&backend);
    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));

    migrator.renormalize_names(EntityType::Author).unwrap();
    migrator.merge_duplicates(EntityType::Author).unwrap();
    let stats = backend.get_stats().unwrap();

    assert_eq!(migrator.renormalize_names(EntityType::Author).unwrap(), 0);
    assert_eq!(migrator.merge_duplicates(EntityType::Author).unwrap(), 0);
    assert_eq!(backend.get_stats().unwrap(), stats);
}

#[test]
fn test_merge_keeps_shared_edges_single() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    seed(&backend, "mag_a", EntityType::Magazine, "週刊少年ジャンプ");
    seed(&backend, "mag_b", EntityType::Magazine, "週刊少年ジャンプ");
    seed(&backend, "work_1", EntityType::Work, "NARUTO 1");
    link(&backend, "mag_a", "work_1", RelationshipType::Contains);
    link(&backend, "mag_b", "work_1", RelationshipType::Contains);

    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));
    assert_eq!(migrator.merge_duplicates(EntityType::Magazine).unwrap(), 1);

    let edges = backend
        .query_relationships(&RelationshipQuery::new().to(EntityId::new("work_1")))
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_entity, EntityId::new("mag_a"));
}

#[test]
fn test_merge_title_variants() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    seed(&backend, "work_a", EntityType::Work, "One Piece");
    seed(&backend, "work_b", EntityType::Work, "ＯＮＥ　ＰＩＥＣＥ");
    seed(&backend, "work_c", EntityType::Work, "ONE PIECE");
    seed(&backend, "work_d", EntityType::Work, "ONE PIECE FILM");
    seed(&backend, "author_oda", EntityType::Author, "尾田栄一郎");
    link(&backend, "author_oda", "work_a", RelationshipType::Created);
    link(&backend, "author_oda", "work_b", RelationshipType::Created);

    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));
    assert_eq!(migrator.merge_title_variants("ONE PIECE").unwrap(), 2);

    let works = backend
        .query_entities(&EntityQuery::new().with_type(EntityType::Work))
        .unwrap();
    let names: Vec<_> = works.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["ONE PIECE", "ONE PIECE FILM"]);
    assert_eq!(works[0].id, EntityId::new("work_c"));

    let created = backend
        .query_relationships(&RelationshipQuery::new().to(EntityId::new("work_c")))
        .unwrap();
    assert_eq!(created.len(), 1);

    assert_eq!(migrator.merge_title_variants("ONE PIECE").unwrap(), 0);
}

#[test]
fn test_rebuild_requires_confirmation() {
    let temp_dir = TempDir::new().unwrap();
    let backend = create_backend(&temp_dir);
    legacy_graph(&backend);
    let migrator = DeduplicationMigrator::with_shared_backend(Arc::clone(&backend));

    let err = migrator.rebuild(RebuildConfirmation::Unconfirmed).unwrap_err();
    assert!(matches!(err, Error::ConfirmationRequired(_)));
    assert_eq!(backend.get_stats().unwrap().entity_count, 6);

    migrator.rebuild(RebuildConfirmation::from_flag(true)).unwrap();
    assert_eq!(backend.get_stats().unwrap().entity_count, 0);
}
