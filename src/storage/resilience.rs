//! Retry wrapper for graph backends.
//!
//! Wraps any [`GraphBackend`] and retries operations that fail with a
//! retryable error (see [`crate::Error::is_retryable`]), backing off exponentially
//! between attempts. Non-retryable errors are returned on the first failure.
//!
//! # Usage
//!
//! ```rust,ignore
//! use manga_graph::storage::{ResilientGraphBackend, RetryConfig, SqliteGraphBackend};
//!
//! let backend = SqliteGraphBackend::new(db_path)?;
//! let resilient = ResilientGraphBackend::new(backend, RetryConfig::default(), "sqlite");
//!
//! // Busy database errors are now retried with backoff
//! resilient.upsert_entity(&entity)?;
//! ```

use super::traits::graph::{GraphBackend, GraphStats, UpsertOutcome};
use crate::models::{Entity, EntityId, EntityQuery, Relationship, RelationshipQuery};
use crate::Result;
use std::time::Duration;

/// Upper bound on the backoff exponent.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Retry configuration for graph backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MANGA_GRAPH_RETRY_MAX") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.max_retries = parsed;
            }
        }
        if let Ok(v) = std::env::var("MANGA_GRAPH_RETRY_BASE_DELAY_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.base_delay_ms = parsed;
            }
        }
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay in milliseconds.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1_u64 << shift))
    }
}

/// Graph backend wrapper that retries conflicting operations.
pub struct ResilientGraphBackend<B: GraphBackend> {
    inner: B,
    config: RetryConfig,
    backend_name: &'static str,
}

impl<B: GraphBackend> ResilientGraphBackend<B> {
    /// Creates a new resilient wrapper around `inner`.
    #[must_use]
    pub const fn new(inner: B, config: RetryConfig, backend_name: &'static str) -> Self {
        Self {
            inner,
            config,
            backend_name,
        }
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub const fn inner(&self) -> &B {
        &self.inner
    }

    fn execute<T, F>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => {
                    self.record_metrics(operation, "success");
                    return Ok(value);
                },
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::warn!(
                        backend = self.backend_name,
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying graph operation"
                    );
                    metrics::counter!(
                        "graph_storage_retries_total",
                        "backend" => self.backend_name,
                        "operation" => operation
                    )
                    .increment(1);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                },
                Err(err) => {
                    self.record_metrics(operation, "error");
                    return Err(err);
                },
            }
        }
    }

    fn record_metrics(&self, operation: &'static str, status: &'static str) {
        metrics::counter!(
            "graph_storage_requests_total",
            "backend" => self.backend_name,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
    }
}

impl<B: GraphBackend> GraphBackend for ResilientGraphBackend<B> {
    fn upsert_entity(&self, entity: &Entity) -> Result<UpsertOutcome> {
        self.execute("upsert_entity", || self.inner.upsert_entity(entity))
    }

    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        self.execute("get_entity", || self.inner.get_entity(id))
    }

    fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        self.execute("query_entities", || self.inner.query_entities(query))
    }

    fn rename_entity(&self, id: &EntityId, name: &str) -> Result<bool> {
        self.execute("rename_entity", || self.inner.rename_entity(id, name))
    }

    fn merge_entities(&self, survivor: &EntityId, others: &[EntityId]) -> Result<Entity> {
        self.execute("merge_entities", || self.inner.merge_entities(survivor, others))
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<bool> {
        self.execute("upsert_relationship", || {
            self.inner.upsert_relationship(relationship)
        })
    }

    fn query_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        self.execute("query_relationships", || self.inner.query_relationships(query))
    }

    fn get_stats(&self) -> Result<GraphStats> {
        self.execute("get_stats", || self.inner.get_stats())
    }

    fn clear(&self) -> Result<()> {
        self.execute("clear", || self.inner.clear())
    }
}
