//! # manga-graph
//!
//! Bibliographic graph for manga works, authors, magazines, and publishers.
//!
//! Records from a media-arts JSON-LD export and a third-party catalog CSV are
//! normalized into canonical entities, merge-upserted into a property graph,
//! and served back as bounded subgraphs for visualization.
//!
//! ## Pipeline
//!
//! - [`services::NameNormalizer`] strips role prefixes and reading annotations
//!   and derives deterministic entity ids
//! - [`services::MagazineExtractor`] pulls serialization magazines out of
//!   free-text descriptions
//! - [`services::GraphIngestor`] merge-upserts entities and relationships
//! - [`services::DeduplicationMigrator`] repairs already-duplicated graphs
//! - [`services::GraphSearchEngine`] expands a search term into a subgraph,
//!   groups volumes into series, and lists related works
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use manga_graph::services::{GraphIngestor, GraphSearchEngine};
//! use manga_graph::storage::SqliteGraphBackend;
//!
//! let backend = Arc::new(SqliteGraphBackend::new("graph.db")?);
//! let ingestor = GraphIngestor::with_shared_backend(Arc::clone(&backend));
//! ingestor.ingest(records)?;
//!
//! let engine = GraphSearchEngine::with_shared_backend(backend);
//! let result = engine.search("NARUTO", 2)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::MangaGraphConfig;
pub use models::{
    Entity, EntityId, EntityType, GraphEdge, GraphNode, GraphSearchResult, PropertyValue,
    RelatedBy, RelatedWork, Relationship, RelationshipType, SeriesSummary, SourceRecord,
};
pub use services::{
    DeduplicationMigrator, GraphIngestor, GraphSearchEngine, MagazineExtractor, NameNormalizer,
};
pub use storage::{GraphBackend, InMemoryGraphBackend, SqliteGraphBackend};

/// Error type for manga-graph operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Unparseable input files, unknown entity types, bad CLI arguments |
/// | `OperationFailed` | Query or I/O failures inside a backend or loader |
/// | `StorageUnavailable` | The graph store cannot be opened or reached |
/// | `Conflict` | A concurrent write collided; retryable |
/// | `ConfirmationRequired` | A destructive operation ran without confirmation |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail
    /// - Input files cannot be read
    /// - A lock guarding in-memory state is poisoned
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The graph store is unreachable.
    ///
    /// Fatal to the calling operation; ingestion aborts and search returns
    /// this instead of an empty result.
    #[error("storage backend '{backend}' unavailable: {cause}")]
    StorageUnavailable {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// A concurrent write collided with another writer.
    ///
    /// Retried with backoff by [`storage::ResilientGraphBackend`].
    #[error("write conflict during '{operation}' on {id}")]
    Conflict {
        /// The operation that conflicted.
        operation: String,
        /// The entity id involved.
        id: String,
    },

    /// A destructive operation was requested without confirmation.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),
}

impl Error {
    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type alias for manga-graph operations.
pub type Result<T> = std::result::Result<T, Error>;
