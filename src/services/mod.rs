//! Business logic services.
//!
//! Services orchestrate storage backends and provide high-level operations:
//! normalizing names, ingesting records, repairing duplicates and searching.

pub mod deduplication;
mod ingestion;
mod magazine_extractor;
pub mod name_normalizer;
mod name_registry;
mod search;

pub use deduplication::{DeduplicationMigrator, DuplicateReport, RebuildConfirmation};
pub use ingestion::{GraphIngestor, IngestReport};
pub use magazine_extractor::MagazineExtractor;
pub use name_normalizer::NameNormalizer;
pub use name_registry::{NameRegistry, display_priority};
pub use search::GraphSearchEngine;
