//! SQLite pool for the event log and organization directory.
//!
//! Every pooled connection runs in WAL mode with `synchronous = NORMAL`, so
//! polling and fetch-by-id readers proceed while an event is appended. A
//! committed event survives a process crash; an OS crash or power loss can
//! roll back the most recent commits.

use crate::migrations::{run_migrations, MigrationError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Per-deployment database tunables, taken from the `[database]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database before failing, in ms.
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("cannot open event database: {0}")]
    Open(#[from] r2d2::Error),

    #[error("cannot bring event database schema up to date: {0}")]
    Schema(#[from] MigrationError),
}

fn configure_connection(conn: &mut Connection, settings: DbRuntimeSettings) -> rusqlite::Result<()> {
    // `PRAGMA journal_mode` answers with the mode actually in effect.
    // A private in-memory database can only ever be "memory".
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !matches!(mode.as_str(), "wal" | "memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(format!("event log requires WAL journaling, database reports {mode}")),
        ));
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms))
}

/// Builds the connection pool without touching the schema.
///
/// With `":memory:"` each pooled connection gets its own empty database, so
/// anything that needs shared state across connections should use a file.
///
/// # Errors
///
/// Returns [`PoolError::Open`] if the first connection cannot be opened or
/// configured.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| configure_connection(conn, settings));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    tracing::debug!(
        path = db_path,
        pool_max_size = settings.pool_max_size,
        "opened event database pool"
    );
    Ok(pool)
}

/// Opens the database and applies any pending migrations.
///
/// Returns the pool together with the number of migrations that ran.
///
/// # Errors
///
/// Returns [`PoolError::Open`] if no connection can be obtained and
/// [`PoolError::Schema`] if a migration fails.
pub fn open_database(db_path: &str, settings: DbRuntimeSettings) -> Result<(DbPool, usize), PoolError> {
    let pool = create_pool(db_path, settings)?;
    let applied = {
        let conn = pool.get()?;
        run_migrations(&conn)?
    };
    Ok((pool, applied))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma<T: rusqlite::types::FromSql>(conn: &Connection, name: &str) -> T {
        conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))
            .expect("should read pragma")
    }

    #[test]
    fn file_connections_use_wal_and_normal_sync() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flow.db");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(path.to_str().unwrap(), settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        assert_eq!(pragma::<String>(&conn, "journal_mode"), "wal");
        // 1 == NORMAL
        assert_eq!(pragma::<i64>(&conn, "synchronous"), 1);
        assert_eq!(pragma::<i64>(&conn, "busy_timeout"), 2_500);
        assert_eq!(pool.max_size(), 3);
    }

    #[test]
    fn memory_database_is_accepted() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_000,
            pool_max_size: 1,
        };
        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");
        assert_eq!(pragma::<String>(&conn, "journal_mode"), "memory");
    }

    #[test]
    fn open_database_migrates_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flow.db");
        let path = path.to_str().unwrap();

        let (_, applied) = open_database(path, DbRuntimeSettings::default()).expect("first open");
        assert_eq!(applied, 3);

        let (pool, applied) = open_database(path, DbRuntimeSettings::default()).expect("second open");
        assert_eq!(applied, 0);
        let conn = pool.get().expect("should get a connection");
        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("events table should exist");
        assert_eq!(events, 0);
    }
}
