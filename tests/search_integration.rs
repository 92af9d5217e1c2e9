//! Search integration tests.
//!
//! Ingests a small media-arts dump into `SQLite` and searches it, and checks
//! storage failures surface as errors rather than empty results.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use manga_graph::io::read_jsonld;
use manga_graph::models::{
    Entity, EntityId, EntityQuery, EntityType, GraphSearchResult, RelatedBy, Relationship,
    RelationshipQuery,
};
use manga_graph::services::{GraphIngestor, GraphSearchEngine, NameNormalizer};
use manga_graph::storage::{GraphBackend, GraphStats, SqliteGraphBackend, UpsertOutcome};
use manga_graph::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const DUMP: &str = r#"{"@graph": [
    {
        "@id": "M1",
        "@type": "class:MangaBook",
        "schema:name": "NARUTO 1",
        "schema:creator": "[著]岸本斉史",
        "schema:publisher": "集英社　∥シュウエイシャ",
        "schema:description": "初出：「週刊少年ジャンプ」1999年43号"
    },
    {
        "@id": "M2",
        "@type": "class:MangaBook",
        "schema:name": "ONE PIECE 1",
        "schema:creator": "尾田栄一郎",
        "schema:description": "初出：「週刊少年ジャンプ」1997年34号"
    }
]}"#;

fn naruto_graph() -> Arc<SqliteGraphBackend> {
    let backend = Arc::new(SqliteGraphBackend::in_memory().unwrap());
    let loaded = read_jsonld(DUMP.as_bytes()).unwrap();
    GraphIngestor::with_shared_backend(Arc::clone(&backend))
        .ingest(&loaded.records)
        .unwrap();
    backend
}

fn labels(result: &GraphSearchResult) -> Vec<&str> {
    result.nodes.iter().map(|n| n.label.as_str()).collect()
}

#[test]
fn test_two_hop_search_includes_magazine_edge() {
    let engine = GraphSearchEngine::with_shared_backend(naruto_graph());
    let result = engine.search("NARUTO", 2).unwrap();

    let magazine_id = NameNormalizer::new()
        .canonical_id("週刊少年ジャンプ", EntityType::Magazine)
        .unwrap();
    assert!(
        result
            .edges
            .iter()
            .any(|e| e.source == magazine_id.as_str() && e.edge_type == "contains")
    );

    // Second hop reaches the sibling serialization through the magazine
    let labels = labels(&result);
    assert_eq!(labels[0], "NARUTO 1");
    assert!(labels.contains(&"岸本斉史"));
    assert!(labels.contains(&"集英社"));
    assert!(labels.contains(&"ONE PIECE 1"));
}

#[test]
fn test_search_is_case_insensitive() {
    let engine = GraphSearchEngine::with_shared_backend(naruto_graph());
    let upper = engine.search("NARUTO", 0).unwrap();
    let lower = engine.search("naruto", 0).unwrap();
    assert_eq!(upper, lower);
    assert_eq!(upper.nodes.len(), 1);
}

#[test]
fn test_nodes_and_edges_are_distinct() {
    let engine = GraphSearchEngine::with_shared_backend(naruto_graph());
    let result = engine.search("週刊", 3).unwrap();

    let mut node_ids: Vec<_> = result.nodes.iter().map(|n| n.id.as_str()).collect();
    node_ids.sort_unstable();
    node_ids.dedup();
    assert_eq!(node_ids.len(), result.nodes.len());

    let mut edge_ids: Vec<_> = result.edges.iter().map(|e| e.id.as_str()).collect();
    edge_ids.sort_unstable();
    edge_ids.dedup();
    assert_eq!(edge_ids.len(), result.edges.len());
}

#[test]
fn test_response_envelope() {
    let engine = GraphSearchEngine::with_shared_backend(naruto_graph());
    let response = engine.search("NARUTO", 1).unwrap().into_response();
    assert_eq!(response.total_nodes, response.nodes.len());
    assert_eq!(response.total_edges, response.edges.len());

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["nodes"][0]["type"], "work");
    assert_eq!(json["nodes"][0]["properties"]["title"], "NARUTO 1");
}

/// Backend that counts calls and optionally fails every one.
#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingBackend {
    fn touch<T>(&self, operation: &str, value: T) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::StorageUnavailable {
                backend: "stub".to_string(),
                cause: format!("{operation}: connection refused"),
            });
        }
        Ok(value)
    }
}

impl GraphBackend for CountingBackend {
    fn upsert_entity(&self, _entity: &Entity) -> Result<UpsertOutcome> {
        self.touch("upsert_entity", UpsertOutcome::Created)
    }
    fn get_entity(&self, _id: &EntityId) -> Result<Option<Entity>> {
        self.touch("get_entity", None)
    }
    fn query_entities(&self, _query: &EntityQuery) -> Result<Vec<Entity>> {
        self.touch("query_entities", Vec::new())
    }
    fn rename_entity(&self, _id: &EntityId, _name: &str) -> Result<bool> {
        self.touch("rename_entity", false)
    }
    fn merge_entities(&self, survivor: &EntityId, _others: &[EntityId]) -> Result<Entity> {
        self.touch(
            "merge_entities",
            Entity::new(survivor.clone(), EntityType::Author, "stub"),
        )
    }
    fn upsert_relationship(&self, _relationship: &Relationship) -> Result<bool> {
        self.touch("upsert_relationship", false)
    }
    fn query_relationships(&self, _query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        self.touch("query_relationships", Vec::new())
    }
    fn get_stats(&self) -> Result<GraphStats> {
        self.touch("get_stats", GraphStats::new())
    }
    fn clear(&self) -> Result<()> {
        self.touch("clear", ())
    }
}

#[test]
fn test_blank_term_touches_no_storage() {
    let backend = Arc::new(CountingBackend::default());
    let engine = GraphSearchEngine::with_shared_backend(Arc::clone(&backend));

    assert!(engine.search("", 2).unwrap().is_empty());
    assert!(engine.search(" \t ", 2).unwrap().is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    engine.search("NARUTO", 2).unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_storage_failure_is_an_error() {
    let engine = GraphSearchEngine::new(CountingBackend {
        calls: AtomicUsize::new(0),
        fail: true,
    });

    let err = engine.search("NARUTO", 2).unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }));
}

const SERIES_DUMP: &str = r#"{"@graph": [
    {
        "@id": "M3",
        "@type": "class:MangaBook",
        "schema:name": "NARUTO 2",
        "schema:creator": ["[著]岸本斉史"],
        "schema:volumeNumber": "2",
        "schema:datePublished": "2000-06-02"
    },
    {
        "@id": "M4",
        "@type": "class:MangaBook",
        "schema:name": "サムライ8 八丸伝 1",
        "schema:creator": ["[原作]岸本斉史", "[画]大久保彰"],
        "schema:volumeNumber": "1"
    }
]}"#;

fn work_id(backend: &SqliteGraphBackend, title: &str) -> EntityId {
    backend
        .query_entities(&EntityQuery::new().with_type(EntityType::Work).with_name(title))
        .unwrap()
        .remove(0)
        .id
}

#[test]
fn test_series_and_related_after_import() {
    let backend = naruto_graph();
    let loaded = read_jsonld(SERIES_DUMP.as_bytes()).unwrap();
    GraphIngestor::with_shared_backend(Arc::clone(&backend))
        .ingest(&loaded.records)
        .unwrap();
    let engine = GraphSearchEngine::with_shared_backend(Arc::clone(&backend));

    let series = engine.search_series("naruto").unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].title, "NARUTO");
    assert_eq!(series[0].work_count, 2);
    assert_eq!(series[0].representative.label, "NARUTO 2");

    let naruto = work_id(&backend, "NARUTO 1");
    let by_author = engine.related_works(&naruto, RelatedBy::Author).unwrap();
    let titles: Vec<_> = by_author.iter().map(|r| r.work.label.as_str()).collect();
    assert_eq!(titles, vec!["NARUTO 2", "サムライ8 八丸伝 1"]);
    assert_eq!(by_author[0].via.label, "岸本斉史");

    let by_magazine = engine.related_works(&naruto, RelatedBy::Magazine).unwrap();
    let titles: Vec<_> = by_magazine.iter().map(|r| r.work.label.as_str()).collect();
    assert_eq!(titles, vec!["ONE PIECE 1"]);
}

#[test]
fn test_blank_series_term_touches_no_storage() {
    let backend = Arc::new(CountingBackend::default());
    let engine = GraphSearchEngine::with_shared_backend(Arc::clone(&backend));

    assert!(engine.search_series(" ").unwrap().is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}
