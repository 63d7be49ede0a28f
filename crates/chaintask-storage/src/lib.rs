//! chaintask-storage — storage sinks for ChainTask domain records.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (feature `sqlite`)
//!
//! Both upsert by record key, so replaying a redelivered tipset leaves the
//! stored state unchanged.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
