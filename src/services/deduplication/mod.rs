//! Deduplication passes over an already-populated graph.
//!
//! Ingestion keys every name by its canonical id, so fresh imports do not
//! create duplicates. Graphs loaded before a normalization rule existed can
//! still hold several nodes for one real-world entity; this module repairs
//! them:
//!
//! 1. **`renormalize_names`**: re-apply the current rules to stored names
//! 2. **`merge_duplicates`**: fold nodes sharing a display name into the oldest
//! 3. **`merge_title_variants`**: fold spelling variants of one work title
//!
//! Every pass is idempotent; running it twice merges nothing the second time.
//!
//! # Example
//!
//! ```rust,ignore
//! use manga_graph::services::deduplication::DeduplicationMigrator;
//! use manga_graph::models::EntityType;
//!
//! let migrator = DeduplicationMigrator::new(backend);
//! let report = migrator.find_duplicates(EntityType::Author)?;
//! if !report.is_clean() {
//!     migrator.merge_duplicates(EntityType::Author)?;
//! }
//! ```

mod service;
mod types;

pub use service::DeduplicationMigrator;
pub use types::{DuplicateGroup, DuplicateReport, RebuildConfirmation};
