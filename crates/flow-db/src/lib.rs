//! Database layer for the Flow event stream.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table used by the event store and the
//! organization directory is created through versioned migrations managed by
//! this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: a single dispatcher instance owns its store;
//!   WAL mode allows concurrent readers (polling, fetch-by-id) alongside the
//!   single writer on the append path.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema cannot drift from the code that reads it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_database, DbPool, DbRuntimeSettings, PoolError};
