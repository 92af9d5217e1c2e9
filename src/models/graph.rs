//! Graph types for the bibliographic property graph.
//!
//! # Entity Types
//!
//! | Type | Display field | Identity key |
//! |------|---------------|--------------|
//! | `Author` | normalized creator name | canonical key of the name |
//! | `Publisher` | publisher name without reading annotation | canonical key of the name |
//! | `Magazine` | magazine title | canonical key of the title |
//! | `Work` | title, untouched | source record id, else the title |
//!
//! # Relationship Types
//!
//! - `Created` - Author → Work
//! - `Published` - Publisher → Work
//! - `Contains` - Magazine → Work (media-arts source)
//! - `PublishedIn` - Work → Magazine (catalog source)
//!
//! A relationship is identified by its `(from, type, to)` triple.

use super::property::PropertyMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a graph entity.
///
/// Ids are derived deterministically by
/// [`NameNormalizer::canonical_id`](crate::services::NameNormalizer::canonical_id);
/// the same key and entity type always yield the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity ID from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the entity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type of entity in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Person credited on a work.
    Author,
    /// Publishing house.
    Publisher,
    /// Serialization magazine.
    Magazine,
    /// Manga book or book series.
    Work,
}

impl EntityType {
    /// Returns all entity type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Author, Self::Publisher, Self::Magazine, Self::Work]
    }

    /// Returns the entity type as a string slice.
    ///
    /// Also used as the id prefix, so it must stay stable.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Publisher => "publisher",
            Self::Magazine => "magazine",
            Self::Work => "work",
        }
    }

    /// Parses an entity type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "author" | "authors" | "creator" => Some(Self::Author),
            "publisher" | "publishers" => Some(Self::Publisher),
            "magazine" | "magazines" => Some(Self::Magazine),
            "work" | "works" | "book" | "title" => Some(Self::Work),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// Type of relationship between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Author created a work.
    Created,
    /// Publisher published a work.
    Published,
    /// Magazine carried a work.
    Contains,
    /// Work was serialized in a magazine.
    PublishedIn,
}

impl RelationshipType {
    /// Returns all relationship type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Created,
            Self::Published,
            Self::Contains,
            Self::PublishedIn,
        ]
    }

    /// Returns the relationship tag as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Published => "PUBLISHED",
            Self::Contains => "CONTAINS",
            Self::PublishedIn => "PUBLISHED_IN",
        }
    }

    /// Parses a relationship type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "CREATED" | "CREATED_BY" => Some(Self::Created),
            "PUBLISHED" | "PUBLISHED_BY" => Some(Self::Published),
            "CONTAINS" => Some(Self::Contains),
            "PUBLISHED_IN" | "SERIALIZED_IN" => Some(Self::PublishedIn),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

/// An entity in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier.
    pub id: EntityId,
    /// Type of entity.
    pub entity_type: EntityType,
    /// Display name (title for works).
    pub name: String,
    /// First-seen raw string, kept for audit only.
    pub original_name: Option<String>,
    /// Type-specific properties.
    pub properties: PropertyMap,
    /// Insertion sequence assigned by the backend; 0 until stored.
    pub sequence: u64,
}

impl Entity {
    /// Creates a new entity.
    #[must_use]
    pub fn new(id: EntityId, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            id,
            entity_type,
            name: name.into(),
            original_name: None,
            properties: PropertyMap::new(),
            sequence: 0,
        }
    }

    /// Sets the first-seen raw name.
    #[must_use]
    pub fn with_original_name(mut self, original: impl Into<String>) -> Self {
        self.original_name = Some(original.into());
        self
    }

    /// Adds a property to the entity.
    #[must_use]
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<super::PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds a property if the value is present.
    #[must_use]
    pub fn with_optional_property(
        self,
        key: impl Into<String>,
        value: Option<impl Into<super::PropertyValue>>,
    ) -> Self {
        match value {
            Some(value) => self.with_property(key, value),
            None => self,
        }
    }

    /// Copies properties from `other` whose keys are absent here.
    ///
    /// Existing values win. Returns true if anything was added.
    pub fn absorb_properties(&mut self, other: &PropertyMap) -> bool {
        let mut changed = false;
        for (key, value) in other {
            if !self.properties.contains_key(key) {
                self.properties.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// A directed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity ID.
    pub from_entity: EntityId,
    /// Target entity ID.
    pub to_entity: EntityId,
    /// Type of relationship.
    pub relationship_type: RelationshipType,
    /// Optional properties.
    pub properties: PropertyMap,
}

impl Relationship {
    /// Creates a new relationship.
    #[must_use]
    pub fn new(
        from_entity: EntityId,
        to_entity: EntityId,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            from_entity,
            to_entity,
            relationship_type,
            properties: PropertyMap::new(),
        }
    }

    /// Adds a property to the relationship.
    #[must_use]
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<super::PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the identifying `(from, type, to)` triple.
    #[must_use]
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            from_entity: self.from_entity.clone(),
            relationship_type: self.relationship_type,
            to_entity: self.to_entity.clone(),
        }
    }

    /// Returns true if `id` is either endpoint.
    #[must_use]
    pub fn touches(&self, id: &EntityId) -> bool {
        self.from_entity == *id || self.to_entity == *id
    }

    /// Returns the endpoint opposite `id`, if `id` is an endpoint.
    #[must_use]
    pub fn other_end(&self, id: &EntityId) -> Option<&EntityId> {
        if self.from_entity == *id {
            Some(&self.to_entity)
        } else if self.to_entity == *id {
            Some(&self.from_entity)
        } else {
            None
        }
    }
}

/// Identity of a relationship: the ordered `(from, type, to)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    /// Source entity ID.
    pub from_entity: EntityId,
    /// Type of relationship.
    pub relationship_type: RelationshipType,
    /// Target entity ID.
    pub to_entity: EntityId,
}

/// Query parameters for searching entities.
///
/// Results are ordered by insertion sequence.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Filter by entity type.
    pub entity_type: Option<EntityType>,
    /// Case-insensitive substring match on the display name.
    pub name_contains: Option<String>,
    /// Exact match on the display name.
    pub name_equals: Option<String>,
    /// Maximum results to return.
    pub limit: Option<usize>,
}

impl EntityQuery {
    /// Creates a new empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entity_type: None,
            name_contains: None,
            name_equals: None,
            limit: None,
        }
    }

    /// Filters by entity type.
    #[must_use]
    pub const fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Matches names containing `term`, ignoring case.
    #[must_use]
    pub fn with_name_containing(mut self, term: impl Into<String>) -> Self {
        self.name_contains = Some(term.into());
        self
    }

    /// Matches names equal to `name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_equals = Some(name.into());
        self
    }

    /// Sets maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `entity` satisfies the type and name filters.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        if self.entity_type.is_some_and(|t| t != entity.entity_type) {
            return false;
        }
        if self.name_equals.as_ref().is_some_and(|name| *name != entity.name) {
            return false;
        }
        self.name_contains
            .as_ref()
            .is_none_or(|term| fold_case(&entity.name).contains(&fold_case(term)))
    }
}

/// Query parameters for relationships.
///
/// Results are ordered by insertion.
#[derive(Debug, Clone, Default)]
pub struct RelationshipQuery {
    /// Source entity filter.
    pub from_entity: Option<EntityId>,
    /// Target entity filter.
    pub to_entity: Option<EntityId>,
    /// Matches relationships with this entity at either end.
    pub touching: Option<EntityId>,
    /// Filter by relationship type.
    pub relationship_type: Option<RelationshipType>,
    /// Maximum results to return.
    pub limit: Option<usize>,
}

impl RelationshipQuery {
    /// Creates a new empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            from_entity: None,
            to_entity: None,
            touching: None,
            relationship_type: None,
            limit: None,
        }
    }

    /// Sets the source entity.
    #[must_use]
    pub fn from(mut self, entity_id: EntityId) -> Self {
        self.from_entity = Some(entity_id);
        self
    }

    /// Sets the target entity.
    #[must_use]
    pub fn to(mut self, entity_id: EntityId) -> Self {
        self.to_entity = Some(entity_id);
        self
    }

    /// Matches relationships in either direction around `entity_id`.
    #[must_use]
    pub fn touching(mut self, entity_id: EntityId) -> Self {
        self.touching = Some(entity_id);
        self
    }

    /// Filters by relationship type.
    #[must_use]
    pub const fn with_type(mut self, relationship_type: RelationshipType) -> Self {
        self.relationship_type = Some(relationship_type);
        self
    }

    /// Sets maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `rel` satisfies every filter.
    #[must_use]
    pub fn matches(&self, rel: &Relationship) -> bool {
        self.from_entity.as_ref().is_none_or(|id| rel.from_entity == *id)
            && self.to_entity.as_ref().is_none_or(|id| rel.to_entity == *id)
            && self.touching.as_ref().is_none_or(|id| rel.touches(id))
            && self
                .relationship_type
                .is_none_or(|t| rel.relationship_type == t)
    }
}

/// Unicode-aware case folding used for name matching.
#[must_use]
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}
