//! Graph storage backends for the bibliographic graph.
//!
//! This module provides implementations of the [`GraphBackend`] trait for
//! storing and querying authors, publishers, magazines and works.
//!
//! # Available Backends
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | [`SqliteGraphBackend`] | Default; embedded | Unique edge triples, FK cascades |
//! | [`InMemoryGraphBackend`] | Testing | Fast, no persistence |
//!
//! # Example
//!
//! ```rust,ignore
//! use manga_graph::storage::graph::SqliteGraphBackend;
//! use manga_graph::storage::GraphBackend;
//! use manga_graph::models::{Entity, EntityId, EntityQuery, EntityType};
//!
//! let backend = SqliteGraphBackend::new("graph.db")?;
//!
//! let author = Entity::new(EntityId::new("author_1"), EntityType::Author, "尾田栄一郎");
//! backend.upsert_entity(&author)?;
//!
//! let authors = backend.query_entities(&EntityQuery::new().with_type(EntityType::Author))?;
//! ```

mod memory;
mod sqlite;

pub use memory::InMemoryGraphBackend;
pub use sqlite::SqliteGraphBackend;

// Re-export trait for convenience
pub use crate::storage::traits::graph::{GraphBackend, GraphStats};
