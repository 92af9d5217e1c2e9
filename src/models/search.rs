//! Search result types handed to the visualization client.

use super::graph::{Entity, EntityType, Relationship};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Label used when a node has neither a title nor a name.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A node in a search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    /// Entity id.
    pub id: String,
    /// Display label: `title`, else `name`, else `"Unknown"`.
    pub label: String,
    /// Lower-cased entity type tag.
    #[serde(rename = "type")]
    pub node_type: String,
    /// All stored properties, client-ready.
    pub properties: Map<String, Value>,
}

impl GraphNode {
    /// Builds a node from a stored entity.
    ///
    /// Works expose their display string as `title`, everything else as `name`.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        let mut properties: Map<String, Value> = entity
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();

        let display_key = if entity.entity_type == EntityType::Work {
            "title"
        } else {
            "name"
        };
        if !entity.name.is_empty() {
            properties.insert(display_key.to_string(), Value::String(entity.name.clone()));
        }
        if let Some(original) = &entity.original_name {
            properties.insert("original_name".to_string(), Value::String(original.clone()));
        }
        properties.insert("id".to_string(), Value::String(entity.id.to_string()));

        let label = ["title", "name"]
            .iter()
            .find_map(|key| properties.get(*key).and_then(Value::as_str))
            .unwrap_or(UNKNOWN_LABEL)
            .to_string();

        Self {
            id: entity.id.to_string(),
            label,
            node_type: entity.entity_type.as_str().to_string(),
            properties,
        }
    }
}

/// An edge in a search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    /// `"{source}-{TYPE}-{target}"`.
    pub id: String,
    /// Source entity id.
    pub source: String,
    /// Target entity id.
    pub target: String,
    /// Lower-cased relationship tag.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Relationship properties, client-ready.
    pub properties: Map<String, Value>,
}

impl GraphEdge {
    /// Builds an edge from a stored relationship.
    #[must_use]
    pub fn from_relationship(rel: &Relationship) -> Self {
        let tag = rel.relationship_type.as_str();
        Self {
            id: format!("{}-{tag}-{}", rel.from_entity, rel.to_entity),
            source: rel.from_entity.to_string(),
            target: rel.to_entity.to_string(),
            edge_type: tag.to_lowercase(),
            properties: rel
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        }
    }
}

/// Nodes and edges found for a search term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSearchResult {
    /// Distinct nodes, in discovery order.
    pub nodes: Vec<GraphNode>,
    /// Distinct edges, in discovery order.
    pub edges: Vec<GraphEdge>,
}

impl GraphSearchResult {
    /// Creates an empty result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Wraps the result in the response envelope.
    #[must_use]
    pub fn into_response(self) -> SearchResponse {
        SearchResponse {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

/// Search response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Result nodes.
    pub nodes: Vec<GraphNode>,
    /// Result edges.
    pub edges: Vec<GraphEdge>,
    /// Number of nodes.
    pub total_nodes: usize,
    /// Number of edges.
    pub total_edges: usize,
}

/// Volumes of one series found by a title search, shown as one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    /// Title with volume and edition suffixes removed.
    pub title: String,
    /// The volume standing in for the series: volume 1 when present.
    pub representative: GraphNode,
    /// Ids of every grouped volume, in insertion order.
    pub work_ids: Vec<String>,
    /// Number of grouped volumes.
    pub work_count: usize,
}

/// Which shared neighbor makes two works related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelatedBy {
    /// Same credited author.
    Author,
    /// Same publisher.
    Publisher,
    /// Same magazine, in an overlapping period.
    Magazine,
}

impl RelatedBy {
    /// Returns the variant as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Publisher => "publisher",
            Self::Magazine => "magazine",
        }
    }

    /// Parses a variant from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "author" | "creator" => Some(Self::Author),
            "publisher" => Some(Self::Publisher),
            "magazine" => Some(Self::Magazine),
            _ => None,
        }
    }
}

impl fmt::Display for RelatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelatedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relation: {s}"))
    }
}

/// A work related to another through a shared neighbor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedWork {
    /// The related work.
    pub work: GraphNode,
    /// The shared author, publisher or magazine.
    pub via: GraphNode,
    /// How the works are related.
    pub related_by: RelatedBy,
}
