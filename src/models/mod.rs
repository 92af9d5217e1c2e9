//! Data models for manga-graph.
//!
//! This module contains the core data structures shared by the services and
//! storage layers.

pub mod graph;
mod property;
pub mod record;
mod search;

pub use graph::{
    Entity, EntityId, EntityQuery, EntityType, Relationship, RelationshipKey, RelationshipQuery,
    RelationshipType,
};
pub use property::{PropertyMap, PropertyValue};
pub use record::{CatalogRecord, MediaArtsRecord, RecordKind, SourceRecord};
pub use search::{
    GraphEdge, GraphNode, GraphSearchResult, RelatedBy, RelatedWork, SearchResponse,
    SeriesSummary, UNKNOWN_LABEL,
};
