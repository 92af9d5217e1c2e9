//! Storage layer abstraction.
//!
//! The bibliographic graph is stored behind the [`GraphBackend`] trait:
//! - **`SQLite`**: durable, embedded storage (default)
//! - **In-memory**: for tests and throwaway runs
//!
//! [`ResilientGraphBackend`] wraps either backend with retry on conflicts.

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod graph;
pub mod resilience;
pub mod traits;

pub use graph::{InMemoryGraphBackend, SqliteGraphBackend};
pub use resilience::{ResilientGraphBackend, RetryConfig};
pub use traits::{GraphBackend, GraphStats, UpsertOutcome};
