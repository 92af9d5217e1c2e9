//! `SQLite` graph backend.
//!
//! Entities and relationships live in two tables. Relationship identity is
//! enforced by a `UNIQUE (from, to, type)` constraint, so duplicate triples
//! collapse at the storage layer rather than in application code.

// SQLite returns i64; sequences and counts are non-negative.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::significant_drop_tightening)]

use crate::models::graph::fold_case;
use crate::models::{
    Entity, EntityId, EntityQuery, EntityType, PropertyMap, Relationship, RelationshipQuery,
    RelationshipType,
};
use crate::storage::traits::graph::{GraphBackend, GraphStats, UpsertOutcome};
use crate::{Error, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

const ENTITY_COLUMNS: &str = "seq, id, entity_type, name, original_name, properties";
const RELATIONSHIP_COLUMNS: &str = "from_entity_id, to_entity_id, relationship_type, properties";

/// Helper to acquire mutex lock with poison recovery.
fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Graph SQLite mutex was poisoned, recovering");
            metrics::counter!("graph_sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Maps a `SQLite` error, turning lock contention into a retryable conflict.
fn map_sqlite_error(operation: &str, id: &str, e: &rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::Conflict {
            operation: operation.to_string(),
            id: id.to_string(),
        },
        _ => Error::OperationFailed {
            operation: operation.to_string(),
            cause: e.to_string(),
        },
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(std::io::Error::other(message)))
}

fn properties_to_json(properties: &PropertyMap) -> String {
    serde_json::to_string(properties).unwrap_or_else(|_| "{}".to_string())
}

/// `SQLite`-based graph backend.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. Multi-statement writes
/// run in `IMMEDIATE` transactions; contention with another process surfaces
/// as [`Error::Conflict`] for the retry layer.
///
/// # Schema
///
/// - `graph_entities`: nodes, with `seq` as the stable insertion order and
///   `name_folded` for case-insensitive search
/// - `graph_relationships`: directed edges, unique per `(from, to, type)`,
///   cascading on entity deletion
pub struct SqliteGraphBackend {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteGraphBackend {
    /// Opens (and if needed creates) a graph database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be opened
    /// or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageUnavailable {
                backend: "sqlite".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(&db_path).map_err(|e| Error::StorageUnavailable {
            backend: "sqlite".to_string(),
            cause: format!("{}: {e}", db_path.display()),
        })?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        backend.initialize()?;
        Ok(backend)
    }

    /// Creates an in-memory `SQLite` graph backend (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::StorageUnavailable {
            backend: "sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        backend.initialize()?;
        Ok(backend)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the database schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::StorageUnavailable {
                backend: "sqlite".to_string(),
                cause: e.to_string(),
            })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_entities (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                name_folded TEXT NOT NULL,
                original_name TEXT,
                properties TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS graph_relationships (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                from_entity_id TEXT NOT NULL,
                to_entity_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                UNIQUE (from_entity_id, to_entity_id, relationship_type),
                FOREIGN KEY (from_entity_id) REFERENCES graph_entities(id) ON DELETE CASCADE,
                FOREIGN KEY (to_entity_id) REFERENCES graph_entities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_graph_entities_type ON graph_entities(entity_type, seq);
            CREATE INDEX IF NOT EXISTS idx_graph_entities_name ON graph_entities(entity_type, name);
            CREATE INDEX IF NOT EXISTS idx_graph_relationships_from ON graph_relationships(from_entity_id);
            CREATE INDEX IF NOT EXISTS idx_graph_relationships_to ON graph_relationships(to_entity_id);
            CREATE INDEX IF NOT EXISTS idx_graph_relationships_type ON graph_relationships(relationship_type);",
        )
        .map_err(|e| Error::StorageUnavailable {
            backend: "sqlite".to_string(),
            cause: format!("schema initialization failed: {e}"),
        })?;

        Ok(())
    }

    /// Parses an entity from a row selected with [`ENTITY_COLUMNS`].
    fn parse_entity_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let seq: i64 = row.get(0)?;
        let id: String = row.get(1)?;
        let entity_type_str: String = row.get(2)?;
        let name: String = row.get(3)?;
        let original_name: Option<String> = row.get(4)?;
        let properties_json: String = row.get(5)?;

        let entity_type = EntityType::parse(&entity_type_str)
            .ok_or_else(|| conversion_error(2, format!("unknown entity type: {entity_type_str}")))?;
        let properties: PropertyMap = serde_json::from_str(&properties_json)
            .map_err(|e| conversion_error(5, e.to_string()))?;

        Ok(Entity {
            id: EntityId::new(id),
            entity_type,
            name,
            original_name,
            properties,
            sequence: seq as u64,
        })
    }

    /// Parses a relationship from a row selected with [`RELATIONSHIP_COLUMNS`].
    fn parse_relationship_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
        let from_entity_id: String = row.get(0)?;
        let to_entity_id: String = row.get(1)?;
        let relationship_type_str: String = row.get(2)?;
        let properties_json: String = row.get(3)?;

        let relationship_type = RelationshipType::parse(&relationship_type_str).ok_or_else(|| {
            conversion_error(2, format!("unknown relationship type: {relationship_type_str}"))
        })?;
        let properties: PropertyMap = serde_json::from_str(&properties_json)
            .map_err(|e| conversion_error(3, e.to_string()))?;

        Ok(Relationship {
            from_entity: EntityId::new(from_entity_id),
            to_entity: EntityId::new(to_entity_id),
            relationship_type,
            properties,
        })
    }

    fn select_entity(conn: &Connection, id: &EntityId) -> rusqlite::Result<Option<Entity>> {
        conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM graph_entities WHERE id = ?1"),
            params![id.as_str()],
            Self::parse_entity_row,
        )
        .optional()
    }

    /// Builds WHERE clause conditions for entity queries.
    fn build_entity_where_clause(query: &EntityQuery) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(entity_type) = query.entity_type {
            conditions.push("entity_type = ?");
            params.push(Box::new(entity_type.as_str().to_string()));
        }

        if let Some(ref term) = query.name_contains {
            conditions.push("instr(name_folded, ?) > 0");
            params.push(Box::new(fold_case(term)));
        }

        if let Some(ref name) = query.name_equals {
            conditions.push("name = ?");
            params.push(Box::new(name.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Builds WHERE clause conditions for relationship queries.
    fn build_relationship_where_clause(
        query: &RelationshipQuery,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref from) = query.from_entity {
            conditions.push("from_entity_id = ?");
            params.push(Box::new(from.as_str().to_string()));
        }
        if let Some(ref to) = query.to_entity {
            conditions.push("to_entity_id = ?");
            params.push(Box::new(to.as_str().to_string()));
        }
        if let Some(ref id) = query.touching {
            conditions.push("(from_entity_id = ? OR to_entity_id = ?)");
            params.push(Box::new(id.as_str().to_string()));
            params.push(Box::new(id.as_str().to_string()));
        }
        if let Some(relationship_type) = query.relationship_type {
            conditions.push("relationship_type = ?");
            params.push(Box::new(relationship_type.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl GraphBackend for SqliteGraphBackend {
    // ========================================================================
    // Entity Operations
    // ========================================================================

    #[instrument(skip(self, entity), fields(entity_id = %entity.id))]
    fn upsert_entity(&self, entity: &Entity) -> Result<UpsertOutcome> {
        let op = "upsert_entity";
        let id = entity.id.as_str();
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| map_sqlite_error(op, id, &e))?;

        let existing = Self::select_entity(&tx, &entity.id).map_err(|e| map_sqlite_error(op, id, &e))?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO graph_entities (id, entity_type, name, name_folded, original_name, properties)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        id,
                        entity.entity_type.as_str(),
                        entity.name,
                        fold_case(&entity.name),
                        entity.original_name,
                        properties_to_json(&entity.properties),
                    ],
                )
                .map_err(|e| map_sqlite_error(op, id, &e))?;
                UpsertOutcome::Created
            },
            Some(mut stored) => {
                let mut changed = stored.absorb_properties(&entity.properties);
                if stored.name != entity.name {
                    stored.name.clone_from(&entity.name);
                    changed = true;
                }
                if stored.original_name.is_none() && entity.original_name.is_some() {
                    stored.original_name.clone_from(&entity.original_name);
                    changed = true;
                }
                if changed {
                    tx.execute(
                        "UPDATE graph_entities
                         SET name = ?2, name_folded = ?3, original_name = ?4, properties = ?5
                         WHERE id = ?1",
                        params![
                            id,
                            stored.name,
                            fold_case(&stored.name),
                            stored.original_name,
                            properties_to_json(&stored.properties),
                        ],
                    )
                    .map_err(|e| map_sqlite_error(op, id, &e))?;
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                }
            },
        };

        tx.commit().map_err(|e| map_sqlite_error(op, id, &e))?;

        if outcome.is_created() {
            metrics::counter!("graph_entities_created_total", "type" => entity.entity_type.as_str())
                .increment(1);
        }
        Ok(outcome)
    }

    #[instrument(skip(self), fields(entity_id = %id))]
    fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>> {
        let conn = acquire_lock(&self.conn);
        Self::select_entity(&conn, id).map_err(|e| map_sqlite_error("get_entity", id.as_str(), &e))
    }

    #[instrument(skip(self, query))]
    fn query_entities(&self, query: &EntityQuery) -> Result<Vec<Entity>> {
        let conn = acquire_lock(&self.conn);

        let (where_clause, params) = Self::build_entity_where_clause(query);
        let limit = query.limit.map_or(-1, |l| l as i64);
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM graph_entities {where_clause} ORDER BY seq LIMIT {limit}"
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
            operation: "query_entities_prepare".to_string(),
            cause: e.to_string(),
        })?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();

        stmt.query_map(param_refs.as_slice(), Self::parse_entity_row)
            .and_then(Iterator::collect)
            .map_err(|e| Error::OperationFailed {
                operation: "query_entities".to_string(),
                cause: e.to_string(),
            })
    }

    #[instrument(skip(self), fields(entity_id = %id))]
    fn rename_entity(&self, id: &EntityId, name: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let rows = conn
            .execute(
                "UPDATE graph_entities SET name = ?2, name_folded = ?3 WHERE id = ?1",
                params![id.as_str(), name, fold_case(name)],
            )
            .map_err(|e| map_sqlite_error("rename_entity", id.as_str(), &e))?;
        Ok(rows > 0)
    }

    #[instrument(skip(self, others), fields(survivor = %survivor, others = others.len()))]
    fn merge_entities(&self, survivor: &EntityId, others: &[EntityId]) -> Result<Entity> {
        let op = "merge_entities";
        let sid = survivor.as_str();
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| map_sqlite_error(op, sid, &e))?;

        let mut merged = Self::select_entity(&tx, survivor)
            .map_err(|e| map_sqlite_error(op, sid, &e))?
            .ok_or_else(|| Error::InvalidInput(format!("survivor entity not found: {survivor}")))?;

        let mut absorbed = 0_u64;
        for other_id in others.iter().filter(|id| *id != survivor) {
            let Some(other) =
                Self::select_entity(&tx, other_id).map_err(|e| map_sqlite_error(op, sid, &e))?
            else {
                continue;
            };

            // Copy every incident edge onto the survivor; the unique triple
            // constraint drops duplicates and the filter drops self-loops.
            tx.execute(
                "INSERT OR IGNORE INTO graph_relationships
                     (from_entity_id, to_entity_id, relationship_type, properties)
                 SELECT CASE WHEN from_entity_id = ?2 THEN ?1 ELSE from_entity_id END,
                        CASE WHEN to_entity_id = ?2 THEN ?1 ELSE to_entity_id END,
                        relationship_type, properties
                 FROM graph_relationships
                 WHERE (from_entity_id = ?2 OR to_entity_id = ?2)
                   AND NOT (from_entity_id IN (?1, ?2) AND to_entity_id IN (?1, ?2))
                 ORDER BY seq",
                params![sid, other_id.as_str()],
            )
            .map_err(|e| map_sqlite_error(op, sid, &e))?;

            tx.execute("DELETE FROM graph_entities WHERE id = ?1", params![other_id.as_str()])
                .map_err(|e| map_sqlite_error(op, sid, &e))?;

            merged.absorb_properties(&other.properties);
            if merged.original_name.is_none() {
                merged.original_name = other.original_name;
            }
            absorbed += 1;
        }

        tx.execute(
            "UPDATE graph_entities SET original_name = ?2, properties = ?3 WHERE id = ?1",
            params![sid, merged.original_name, properties_to_json(&merged.properties)],
        )
        .map_err(|e| map_sqlite_error(op, sid, &e))?;

        tx.commit().map_err(|e| map_sqlite_error(op, sid, &e))?;

        metrics::counter!("graph_entities_merged_total").increment(absorbed);
        Ok(merged)
    }

    // ========================================================================
    // Relationship Operations
    // ========================================================================

    #[instrument(skip(self, relationship), fields(
        from = %relationship.from_entity,
        to = %relationship.to_entity,
        rel_type = %relationship.relationship_type
    ))]
    fn upsert_relationship(&self, relationship: &Relationship) -> Result<bool> {
        let conn = acquire_lock(&self.conn);

        let rows = conn
            .execute(
                "INSERT INTO graph_relationships
                     (from_entity_id, to_entity_id, relationship_type, properties)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (from_entity_id, to_entity_id, relationship_type) DO NOTHING",
                params![
                    relationship.from_entity.as_str(),
                    relationship.to_entity.as_str(),
                    relationship.relationship_type.as_str(),
                    properties_to_json(&relationship.properties),
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => Error::InvalidInput(format!(
                    "relationship endpoint not found: {} -> {}",
                    relationship.from_entity, relationship.to_entity
                )),
                _ => map_sqlite_error("upsert_relationship", relationship.from_entity.as_str(), &e),
            })?;

        if rows > 0 {
            metrics::counter!(
                "graph_relationships_created_total",
                "type" => relationship.relationship_type.as_str()
            )
            .increment(1);
        }
        Ok(rows > 0)
    }

    #[instrument(skip(self, query))]
    fn query_relationships(&self, query: &RelationshipQuery) -> Result<Vec<Relationship>> {
        let conn = acquire_lock(&self.conn);

        let (where_clause, params) = Self::build_relationship_where_clause(query);
        let limit = query.limit.map_or(-1, |l| l as i64);
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM graph_relationships {where_clause} ORDER BY seq LIMIT {limit}"
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| Error::OperationFailed {
            operation: "query_relationships_prepare".to_string(),
            cause: e.to_string(),
        })?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();

        stmt.query_map(param_refs.as_slice(), Self::parse_relationship_row)
            .and_then(Iterator::collect)
            .map_err(|e| Error::OperationFailed {
                operation: "query_relationships".to_string(),
                cause: e.to_string(),
            })
    }

    // ========================================================================
    // Utility Operations
    // ========================================================================

    fn get_stats(&self) -> Result<GraphStats> {
        let conn = acquire_lock(&self.conn);
        let stats_error = |e: rusqlite::Error| Error::OperationFailed {
            operation: "get_stats".to_string(),
            cause: e.to_string(),
        };

        let mut stats = GraphStats::new();

        let mut stmt = conn
            .prepare("SELECT entity_type, COUNT(*) FROM graph_entities GROUP BY entity_type")
            .map_err(stats_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(stats_error)?;
        for (type_str, count) in rows {
            if let Some(entity_type) = EntityType::parse(&type_str) {
                stats.entities_by_type.insert(entity_type, count as usize);
                stats.entity_count += count as usize;
            }
        }

        let mut stmt = conn
            .prepare(
                "SELECT relationship_type, COUNT(*) FROM graph_relationships GROUP BY relationship_type",
            )
            .map_err(stats_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(stats_error)?;
        for (type_str, count) in rows {
            if let Some(relationship_type) = RelationshipType::parse(&type_str) {
                stats
                    .relationships_by_type
                    .insert(relationship_type, count as usize);
                stats.relationship_count += count as usize;
            }
        }

        Ok(stats)
    }

    fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "BEGIN IMMEDIATE;
             DELETE FROM graph_relationships;
             DELETE FROM graph_entities;
             COMMIT;",
        )
        .map_err(|e| map_sqlite_error("clear", "*", &e))?;
        tracing::info!("Graph cleared");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::redundant_clone)]
mod tests {
    use super::*;
    use crate::models::PropertyValue;
    use tempfile::TempDir;

    fn entity(id: &str, entity_type: EntityType, name: &str) -> Entity {
        Entity::new(EntityId::new(id), entity_type, name)
    }

    fn created(backend: &SqliteGraphBackend, from: &str, to: &str, t: RelationshipType) -> bool {
        backend
            .upsert_relationship(&Relationship::new(EntityId::new(from), EntityId::new(to), t))
            .unwrap()
    }

    #[test]
    fn test_upsert_entity_round_trip() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        let work = entity("work_1", EntityType::Work, "NARUTO 1")
            .with_property("publication_date", PropertyValue::parse_date("2000-03-03"))
            .with_property("isbn", "4088728408");

        assert_eq!(backend.upsert_entity(&work).unwrap(), UpsertOutcome::Created);
        let stored = backend.get_entity(&work.id).unwrap().unwrap();
        assert_eq!(stored.name, "NARUTO 1");
        assert_eq!(stored.properties, work.properties);
        assert_eq!(stored.sequence, 1);
    }

    #[test]
    fn test_upsert_entity_keeps_identity_fields() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        let first = entity("publisher_1", EntityType::Publisher, "集英社")
            .with_original_name("集英社　∥シュウエイシャ")
            .with_property("source", "media_arts");
        backend.upsert_entity(&first).unwrap();

        let second = entity("publisher_1", EntityType::Publisher, "集英社")
            .with_original_name("集英社")
            .with_property("source", "catalog")
            .with_property("country", "JP");
        assert_eq!(backend.upsert_entity(&second).unwrap(), UpsertOutcome::Updated);
        assert_eq!(backend.upsert_entity(&second).unwrap(), UpsertOutcome::Unchanged);

        let stored = backend.get_entity(&first.id).unwrap().unwrap();
        assert_eq!(stored.original_name.as_deref(), Some("集英社　∥シュウエイシャ"));
        assert_eq!(stored.properties.get("source"), Some(&PropertyValue::from("media_arts")));
        assert_eq!(stored.properties.get("country"), Some(&PropertyValue::from("JP")));
        assert_eq!(backend.get_stats().unwrap().entity_count, 1);
    }

    #[test]
    fn test_relationship_triples_collapse() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("author_1", EntityType::Author, "a")).unwrap();
        backend.upsert_entity(&entity("work_1", EntityType::Work, "w")).unwrap();

        assert!(created(&backend, "author_1", "work_1", RelationshipType::Created));
        assert!(!created(&backend, "author_1", "work_1", RelationshipType::Created));
        assert_eq!(backend.get_stats().unwrap().relationship_count, 1);
    }

    #[test]
    fn test_relationship_requires_endpoints() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("author_1", EntityType::Author, "a")).unwrap();
        let result = backend.upsert_relationship(&Relationship::new(
            EntityId::new("author_1"),
            EntityId::new("work_missing"),
            RelationshipType::Created,
        ));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_query_entities_unicode_case_insensitive() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("work_1", EntityType::Work, "ÉCOLE")).unwrap();
        backend.upsert_entity(&entity("work_2", EntityType::Work, "ONE PIECE")).unwrap();

        let found = backend
            .query_entities(&EntityQuery::new().with_name_containing("école"))
            .unwrap();
        assert_eq!(found.len(), 1);

        let found = backend
            .query_entities(&EntityQuery::new().with_name_containing("one pi"))
            .unwrap();
        assert_eq!(found[0].id.as_str(), "work_2");
    }

    #[test]
    fn test_query_entities_exact_name() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("author_1", EntityType::Author, "尾田栄一郎")).unwrap();
        backend.upsert_entity(&entity("author_2", EntityType::Author, "[著]尾田栄一郎")).unwrap();
        backend.upsert_entity(&entity("work_1", EntityType::Work, "尾田栄一郎")).unwrap();

        let found = backend
            .query_entities(
                &EntityQuery::new()
                    .with_type(EntityType::Author)
                    .with_name("尾田栄一郎"),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "author_1");
    }

    #[test]
    fn test_query_relationships_touching() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        for (id, t) in [
            ("work_n", EntityType::Work),
            ("magazine_j", EntityType::Magazine),
            ("author_k", EntityType::Author),
        ] {
            backend.upsert_entity(&entity(id, t, id)).unwrap();
        }
        created(&backend, "work_n", "magazine_j", RelationshipType::PublishedIn);
        created(&backend, "author_k", "work_n", RelationshipType::Created);

        let rels = backend
            .query_relationships(&RelationshipQuery::new().touching(EntityId::new("work_n")))
            .unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].relationship_type, RelationshipType::PublishedIn);

        let limited = backend
            .query_relationships(
                &RelationshipQuery::new()
                    .touching(EntityId::new("work_n"))
                    .with_limit(1),
            )
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_merge_entities() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("author_a", EntityType::Author, "尾田栄一郎")).unwrap();
        backend
            .upsert_entity(
                &entity("author_b", EntityType::Author, "尾田栄一郎")
                    .with_original_name("[著]尾田栄一郎")
                    .with_property("source", "catalog"),
            )
            .unwrap();
        backend.upsert_entity(&entity("work_1", EntityType::Work, "ONE PIECE 1")).unwrap();
        backend.upsert_entity(&entity("work_2", EntityType::Work, "ONE PIECE 2")).unwrap();
        created(&backend, "author_a", "work_1", RelationshipType::Created);
        created(&backend, "author_b", "work_1", RelationshipType::Created);
        created(&backend, "author_b", "work_2", RelationshipType::Created);

        let merged = backend
            .merge_entities(&EntityId::new("author_a"), &[EntityId::new("author_b")])
            .unwrap();
        assert_eq!(merged.original_name.as_deref(), Some("[著]尾田栄一郎"));
        assert!(merged.properties.contains_key("source"));
        assert!(backend.get_entity(&EntityId::new("author_b")).unwrap().is_none());

        let rels = backend
            .query_relationships(&RelationshipQuery::new().from(EntityId::new("author_a")))
            .unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(backend.get_stats().unwrap().relationship_count, 2);
    }

    #[test]
    fn test_merge_requires_survivor() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        let result = backend.merge_entities(&EntityId::new("author_x"), &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rename_and_clear() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend.upsert_entity(&entity("work_1", EntityType::Work, "One piece")).unwrap();
        assert!(backend.rename_entity(&EntityId::new("work_1"), "ONE PIECE").unwrap());
        assert!(!backend.rename_entity(&EntityId::new("work_9"), "x").unwrap());
        let found = backend
            .query_entities(&EntityQuery::new().with_name_containing("one piece"))
            .unwrap();
        assert_eq!(found[0].name, "ONE PIECE");

        backend.clear().unwrap();
        assert_eq!(backend.get_stats().unwrap(), GraphStats::new());
    }

    #[test]
    fn test_file_backed_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        {
            let backend = SqliteGraphBackend::new(&path).unwrap();
            backend.upsert_entity(&entity("author_1", EntityType::Author, "a")).unwrap();
            assert_eq!(backend.db_path(), Some(path.as_path()));
        }
        let reopened = SqliteGraphBackend::new(&path).unwrap();
        assert!(reopened.get_entity(&EntityId::new("author_1")).unwrap().is_some());
    }
}
