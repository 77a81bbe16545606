//! Embedded schema migrations.
//!
//! Each migration is a SQL file compiled into the binary and applied at most
//! once, in order, inside its own transaction. Applied names are recorded in
//! `_flow_migrations`.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const TRACKING_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS _flow_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);";

/// Ordered schema history. Append only.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_organizations",
        sql: include_str!("migrations/001_organizations.sql"),
    },
    Migration {
        name: "002_events",
        sql: include_str!("migrations/002_events.sql"),
    },
];

/// Errors raised while bringing the schema up to date.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A statement within the named migration failed; nothing from it was kept.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    /// The tracking table could not be read.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration and returns how many ran.
///
/// # Errors
///
/// Returns `MigrationError` if a migration fails or the tracking table
/// cannot be queried. A failed migration leaves no partial changes behind.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_all(conn, MIGRATIONS)
}

fn apply_all(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(TRACKING_TABLE_DDL)
        .map_err(|source| MigrationError::ExecutionFailed {
            name: "_flow_migrations_bootstrap".to_string(),
            source,
        })?;

    let mut applied = 0;
    for migration in migrations {
        let done: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _flow_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if done {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");
        apply_one(conn, migration).map_err(|source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        })?;
        applied += 1;
    }

    Ok(applied)
}

fn apply_one(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _flow_migrations (name) VALUES (?1)",
        [migration.name],
    )?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn fresh_database_gets_full_schema() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(applied, 3);

        assert!(table_exists(&conn, "organizations"));
        assert!(table_exists(&conn, "events"));

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _flow_migrations", [], |row| row.get(0))
            .expect("should count applied migrations");
        assert_eq!(recorded, 3);
    }

    #[test]
    fn second_run_applies_nothing() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        assert_eq!(run_migrations(&conn).expect("first run"), 3);
        assert_eq!(run_migrations(&conn).expect("second run"), 0);
    }

    #[test]
    fn event_ids_are_unique() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        let insert = "INSERT INTO events (id, org_id, timestamp_us, body) VALUES (?1, ?2, ?3, ?4)";
        let id = "ab".repeat(32);
        conn.execute(insert, rusqlite::params![id, "abababababababab", 1_i64, b"x".to_vec()])
            .expect("first insert");
        let err = conn
            .execute(insert, rusqlite::params![id, "abababababababab", 2_i64, b"y".to_vec()])
            .expect_err("duplicate id must be rejected");
        assert!(matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        ));
    }

    #[test]
    fn failed_migration_leaves_no_partial_changes() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let broken = [Migration {
            name: "001_half_applied",
            sql: "
                CREATE TABLE half_applied (id INTEGER PRIMARY KEY);
                INSERT INTO no_such_table VALUES (1);
            ",
        }];

        let err = apply_all(&conn, &broken).expect_err("broken migration should fail");
        match err {
            MigrationError::ExecutionFailed { name, .. } => assert_eq!(name, "001_half_applied"),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(!table_exists(&conn, "half_applied"));
        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _flow_migrations", [], |row| row.get(0))
            .expect("should count applied migrations");
        assert_eq!(recorded, 0);
    }
}
