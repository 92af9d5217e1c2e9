//! Deduplication result types.

use crate::models::{EntityId, EntityType};
use serde::Serialize;

/// Nodes of one type sharing a display name.
///
/// # Example
///
/// ```rust
/// use manga_graph::services::deduplication::DuplicateGroup;
/// use manga_graph::models::{EntityId, EntityType};
///
/// let group = DuplicateGroup {
///     entity_type: EntityType::Author,
///     name: "尾田栄一郎".to_string(),
///     survivor: EntityId::new("author_a"),
///     duplicates: vec![EntityId::new("author_b")],
/// };
/// assert_eq!(group.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Type shared by every member.
    pub entity_type: EntityType,
    /// Display name shared by every member.
    pub name: String,
    /// Member with the lowest insertion sequence.
    pub survivor: EntityId,
    /// Remaining members, in insertion order.
    pub duplicates: Vec<EntityId>,
}

impl DuplicateGroup {
    /// Number of nodes in the group, survivor included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicates.len() + 1
    }

    /// Always false; a group has at least its survivor.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// Read-only duplicate check for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    /// Type checked.
    pub entity_type: EntityType,
    /// Groups with more than one member, ordered by survivor sequence.
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    /// Number of nodes a merge pass would delete.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.duplicates.len()).sum()
    }

    /// Returns true if no duplicates were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Explicit consent for destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildConfirmation {
    /// The caller confirmed the graph may be cleared.
    Confirmed,
    /// No confirmation was given.
    Unconfirmed,
}

impl RebuildConfirmation {
    /// Maps a `--yes` style flag.
    #[must_use]
    pub const fn from_flag(confirmed: bool) -> Self {
        if confirmed {
            Self::Confirmed
        } else {
            Self::Unconfirmed
        }
    }
}
