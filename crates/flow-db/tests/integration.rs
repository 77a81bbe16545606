use flow_db::{create_pool, run_migrations, DbRuntimeSettings};

#[test]
fn pooled_connections_share_migrated_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flow.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");

    {
        let conn = pool.get().expect("failed to get connection");
        assert_eq!(run_migrations(&conn).expect("failed to run migrations"), 3);
    }

    // A second checkout sees the schema written through the first.
    let a = pool.get().expect("first connection");
    let b = pool.get().expect("second connection");
    let mut stmt = b
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to list tables")
        .map(|r| r.expect("failed to read table name"))
        .collect();
    assert_eq!(tables, vec!["_flow_migrations", "events", "organizations"]);

    assert_eq!(run_migrations(&a).expect("rerun"), 0);
}

#[test]
fn reopening_an_existing_file_keeps_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flow.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let pool = create_pool(path, DbRuntimeSettings::default()).expect("pool");
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrate");
        conn.execute(
            "INSERT INTO organizations (org_id, token_hash, created_by) VALUES (?1, ?2, ?3)",
            ["0123456789abcdef", "digest", "admin"],
        )
        .expect("insert org");
    }

    let pool = create_pool(path, DbRuntimeSettings::default()).expect("pool");
    let conn = pool.get().expect("conn");
    assert_eq!(run_migrations(&conn).expect("migrate"), 0);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM organizations", [], |row| row.get(0))
        .expect("count");
    assert_eq!(count, 1);
}
