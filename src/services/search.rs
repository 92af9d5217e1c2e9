//! Bounded subgraph search for visualization.
//!
//! A search runs in two stages:
//!
//! 1. **Seed**: nodes whose name or title contains the term
//!    (case-insensitive), capped at `max_seed_nodes`
//! 2. **Expand**: breadth-first over incident relationships in both
//!    directions, up to `depth` hops, capped at `max_relationships` edges
//!
//! Both caps guarantee termination on any graph.
//!
//! The engine also answers two list-shaped queries over works:
//! [`GraphSearchEngine::search_series`] folds matching volumes into one entry
//! per series, and [`GraphSearchEngine::related_works`] finds works sharing an
//! author, publisher or magazine with a given work.

use crate::config::SearchConfig;
use crate::models::{
    Entity, EntityId, EntityQuery, EntityType, GraphEdge, GraphNode, GraphSearchResult,
    PropertyValue, RelatedBy, RelatedWork, Relationship, RelationshipKey, RelationshipQuery,
    RelationshipType, SeriesSummary,
};
use crate::services::name_normalizer::series_base_title;
use crate::storage::traits::graph::GraphBackend;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Expands a free-text query into a bounded subgraph.
///
/// Read-only; safe to share across threads.
pub struct GraphSearchEngine<B: GraphBackend> {
    backend: Arc<B>,
    config: SearchConfig,
}

impl<B: GraphBackend> GraphSearchEngine<B> {
    /// Creates a new search engine with the given backend.
    pub fn new(backend: B) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Creates a new search engine with a shared backend.
    #[must_use]
    pub fn with_shared_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: SearchConfig::default(),
        }
    }

    /// Replaces the search limits.
    #[must_use]
    pub const fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active search limits.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Searches with the configured default depth.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub fn search_default(&self, term: &str) -> Result<GraphSearchResult> {
        self.search(term, self.config.default_depth)
    }

    /// Searches for `term` and expands `depth` hops around the matches.
    ///
    /// A blank term returns an empty result without touching storage.
    /// Nodes are distinct by id and edges by `(source, type, target)`, both
    /// in discovery order.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails. A failure is never
    /// reported as an empty result.
    #[instrument(
        skip(self),
        fields(nodes = tracing::field::Empty, edges = tracing::field::Empty)
    )]
    pub fn search(&self, term: &str, depth: u32) -> Result<GraphSearchResult> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(GraphSearchResult::new());
        }
        let start = Instant::now();

        let seeds = self.backend.query_entities(
            &EntityQuery::new()
                .with_name_containing(term)
                .with_limit(self.config.max_seed_nodes),
        )?;

        let mut subgraph = Subgraph::new(self.config.max_relationships);
        let mut frontier: Vec<EntityId> = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let id = seed.id.clone();
            if subgraph.add_node(seed) {
                frontier.push(id);
            }
        }

        for _ in 0..depth {
            if frontier.is_empty() || subgraph.is_full() {
                break;
            }
            frontier = self.expand(&frontier, &mut subgraph)?;
        }

        let span = tracing::Span::current();
        span.record("nodes", subgraph.nodes.len());
        span.record("edges", subgraph.edges.len());
        metrics::counter!("graph_searches_total").increment(1);
        tracing::debug!(
            term,
            depth,
            nodes = subgraph.nodes.len(),
            edges = subgraph.edges.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Search complete"
        );

        Ok(subgraph.into_result())
    }

    /// Lists the series whose volumes' titles contain `term`.
    ///
    /// Volumes sharing a [`series_base_title`] form one entry, represented
    /// by volume 1, else the lowest numbered volume, else the earliest
    /// published. Entries are sorted by title and capped at `result_limit`.
    /// A blank term returns nothing without touching storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    #[instrument(skip(self))]
    pub fn search_series(&self, term: &str) -> Result<Vec<SeriesSummary>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let works = self.backend.query_entities(
            &EntityQuery::new()
                .with_type(EntityType::Work)
                .with_name_containing(term),
        )?;

        let mut groups: Vec<(String, Vec<Entity>)> = Vec::new();
        let mut by_title: HashMap<String, usize> = HashMap::new();
        for work in works {
            let index = *by_title
                .entry(series_base_title(&work.name))
                .or_insert_with_key(|title| {
                    groups.push((title.clone(), Vec::new()));
                    groups.len() - 1
                });
            groups[index].1.push(work);
        }

        let mut series: Vec<SeriesSummary> = groups
            .into_iter()
            .filter_map(|(title, works)| {
                let representative = works.iter().min_by_key(|w| representative_order(w))?;
                Some(SeriesSummary {
                    title,
                    representative: GraphNode::from_entity(representative),
                    work_ids: works.iter().map(|w| w.id.to_string()).collect(),
                    work_count: works.len(),
                })
            })
            .collect();
        series.sort_by(|a, b| a.title.cmp(&b.title));
        series.truncate(self.config.result_limit);

        metrics::counter!("graph_series_searches_total").increment(1);
        tracing::debug!(term, series = series.len(), "Series search complete");
        Ok(series)
    }

    /// Lists works sharing an author, publisher or magazine with `work_id`.
    ///
    /// For [`RelatedBy::Magazine`], works whose publication years differ by
    /// more than `related_year_range` are left out; works without a date
    /// are kept. Results are distinct, in discovery order, and capped at
    /// `result_limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `work_id` is not a stored work, or
    /// an error if a storage operation fails.
    #[instrument(skip(self), fields(work_id = %work_id))]
    pub fn related_works(
        &self,
        work_id: &EntityId,
        related_by: RelatedBy,
    ) -> Result<Vec<RelatedWork>> {
        let work = self
            .backend
            .get_entity(work_id)?
            .filter(|e| e.entity_type == EntityType::Work)
            .ok_or_else(|| Error::InvalidInput(format!("no work with id {work_id}")))?;

        let kinds: &[RelationshipType] = match related_by {
            RelatedBy::Author => &[RelationshipType::Created],
            RelatedBy::Publisher => &[RelationshipType::Published],
            RelatedBy::Magazine => &[RelationshipType::Contains, RelationshipType::PublishedIn],
        };
        let year = publication_year(&work);
        let limit = self.config.result_limit;

        let mut seen = HashSet::from([work.id.clone()]);
        let mut related = Vec::new();
        'shared: for shared_id in self.neighbors(&work.id, kinds)? {
            let Some(shared) = self.backend.get_entity(&shared_id)? else {
                continue;
            };
            let via = GraphNode::from_entity(&shared);

            for other_id in self.neighbors(&shared_id, kinds)? {
                if !seen.insert(other_id.clone()) {
                    continue;
                }
                let Some(other) = self.backend.get_entity(&other_id)? else {
                    continue;
                };
                if other.entity_type != EntityType::Work {
                    continue;
                }
                if related_by == RelatedBy::Magazine
                    && !within_years(
                        year,
                        publication_year(&other),
                        self.config.related_year_range,
                    )
                {
                    continue;
                }
                if related.len() >= limit {
                    break 'shared;
                }
                related.push(RelatedWork {
                    work: GraphNode::from_entity(&other),
                    via: via.clone(),
                    related_by,
                });
            }
        }

        metrics::counter!("graph_related_queries_total", "by" => related_by.as_str()).increment(1);
        Ok(related)
    }

    /// Distinct ids across `id`'s relationships of the given types.
    fn neighbors(&self, id: &EntityId, kinds: &[RelationshipType]) -> Result<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = Vec::new();
        for kind in kinds {
            let relationships = self.backend.query_relationships(
                &RelationshipQuery::new().touching(id.clone()).with_type(*kind),
            )?;
            for rel in relationships {
                if let Some(other) = rel.other_end(id) {
                    if !ids.contains(other) {
                        ids.push(other.clone());
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Follows every relationship touching the frontier one hop out.
    ///
    /// Returns the nodes discovered by this hop.
    fn expand(&self, frontier: &[EntityId], subgraph: &mut Subgraph) -> Result<Vec<EntityId>> {
        let mut next = Vec::new();

        for id in frontier {
            if subgraph.is_full() {
                break;
            }
            let relationships = self
                .backend
                .query_relationships(&RelationshipQuery::new().touching(id.clone()))?;

            for rel in relationships {
                if subgraph.is_full() {
                    break;
                }
                if subgraph.has_edge(&rel.key()) {
                    continue;
                }
                let Some(other) = rel.other_end(id).cloned() else {
                    continue;
                };
                if !subgraph.has_node(&other) {
                    let Some(entity) = self.backend.get_entity(&other)? else {
                        tracing::warn!(entity_id = %other, "Relationship points at missing entity");
                        continue;
                    };
                    subgraph.add_node(entity);
                    next.push(other);
                }
                subgraph.add_edge(&rel);
            }
        }

        Ok(next)
    }
}

/// Sort key choosing a series representative: numbered volumes first,
/// lowest number first, then earliest publication, then insertion order.
fn representative_order(work: &Entity) -> (bool, u32, NaiveDate, u64) {
    let volume = volume_number(work);
    let published = match work.properties.get("publication_date") {
        Some(PropertyValue::Date(date)) => *date,
        _ => NaiveDate::MAX,
    };
    (volume.is_none(), volume.unwrap_or(0), published, work.sequence)
}

/// Volume number from the `volume` property: an integer, or the first run
/// of digits in text such as `第3巻`.
fn volume_number(work: &Entity) -> Option<u32> {
    match work.properties.get("volume")? {
        PropertyValue::Integer(n) => u32::try_from(*n).ok(),
        PropertyValue::Text(text) => {
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        },
        _ => None,
    }
}

fn publication_year(work: &Entity) -> Option<i32> {
    match work.properties.get("publication_date")? {
        PropertyValue::Date(date) => Some(date.year()),
        _ => None,
    }
}

/// Unknown years never exclude a work.
const fn within_years(a: Option<i32>, b: Option<i32>, range: u32) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.abs_diff(b) <= range,
        _ => true,
    }
}

/// Accumulates distinct nodes and edges in discovery order.
struct Subgraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_ids: HashSet<EntityId>,
    edge_keys: HashSet<RelationshipKey>,
    max_edges: usize,
}

impl Subgraph {
    fn new(max_edges: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_ids: HashSet::new(),
            edge_keys: HashSet::new(),
            max_edges,
        }
    }

    fn has_node(&self, id: &EntityId) -> bool {
        self.node_ids.contains(id)
    }

    fn has_edge(&self, key: &RelationshipKey) -> bool {
        self.edge_keys.contains(key)
    }

    fn add_node(&mut self, entity: Entity) -> bool {
        if !self.node_ids.insert(entity.id.clone()) {
            return false;
        }
        self.nodes.push(GraphNode::from_entity(&entity));
        true
    }

    fn add_edge(&mut self, rel: &Relationship) {
        if self.edge_keys.insert(rel.key()) {
            self.edges.push(GraphEdge::from_relationship(rel));
        }
    }

    fn is_full(&self) -> bool {
        self.edges.len() >= self.max_edges
    }

    fn into_result(self) -> GraphSearchResult {
        GraphSearchResult {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}
