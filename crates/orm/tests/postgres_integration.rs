//! End-to-end migrations against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;

use hookdb_orm::{
    generate_id, ConnectionManager, DatabaseConfig, DatabaseValue, ErrorKind,
    FileMigrationProvider, Migrator, OrmError,
};
use tempfile::TempDir;

fn config(table: &str) -> DatabaseConfig {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    DatabaseConfig::new(url)
        .with_migrations_table(table)
        .with_retry(3, 100)
}

fn write_migrations(dir: &TempDir, suffix: &str) {
    std::fs::write(
        dir.path().join("0001_init.sql"),
        format!(
            "-- Up migration\n\
             CREATE TABLE hooks_{s} (id VARCHAR(32) PRIMARY KEY, url TEXT NOT NULL);\n\
             -- Down migration\n\
             DROP TABLE hooks_{s};\n",
            s = suffix
        ),
    )
    .unwrap();

    let step = dir.path().join("0002_add_enabled");
    std::fs::create_dir_all(&step).unwrap();
    std::fs::write(
        step.join("up.sql"),
        format!("ALTER TABLE hooks_{} ADD COLUMN enabled BOOLEAN NOT NULL DEFAULT TRUE;", suffix),
    )
    .unwrap();
    std::fs::write(
        step.join("down.sql"),
        format!("ALTER TABLE hooks_{} DROP COLUMN enabled;", suffix),
    )
    .unwrap();
}

#[tokio::test]
#[ignore]
async fn migrate_latest_and_back() {
    let suffix = generate_id();
    let table = format!("it_migration_{}", suffix);
    let dir = TempDir::new().unwrap();
    write_migrations(&dir, &suffix);

    let connections = Arc::new(ConnectionManager::new(config(&table)));
    let migrator = Migrator::new(
        connections.clone(),
        Arc::new(FileMigrationProvider::new(dir.path())),
    );

    let set = migrator.migrate_to_latest().await;
    assert!(set.is_success(), "{:?}", set.error);
    assert_eq!(set.applied(), vec!["0001_init", "0002_add_enabled"]);
    assert!(migrator.migrate_to_latest().await.results.is_empty());

    let listed = migrator.list().await.unwrap();
    assert!(listed.iter().all(|m| m.is_executed()));

    let handle = connections.get_handle().await.unwrap();
    let insert = format!("INSERT INTO hooks_{} (id, url) VALUES ($1, $2)", suffix);
    let id = handle.generate_id();
    let params = [DatabaseValue::from(id.as_str()), DatabaseValue::from("https://example.test/hook")];
    handle.execute_with_retry(&insert, &params).await.unwrap();

    // Reusing the same id is a unique violation, retried until the budget runs out
    let err = handle.execute_with_retry(&insert, &params).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);

    let set = migrator.migrate_to("0001_init").await;
    assert_eq!(set.reverted(), vec!["0002_add_enabled"]);

    let set = migrator.migrate_down().await;
    assert_eq!(set.reverted(), vec!["0001_init"]);

    handle
        .execute(&format!("DROP TABLE {}", table), &[])
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn failing_statement_halts_with_migration_error() {
    let suffix = generate_id();
    let table = format!("it_migration_{}", suffix);
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("0001_broken.sql"),
        "-- Up migration\nCREATE TABLE missing_paren (id INT;\n-- Down migration\nSELECT 1;\n",
    )
    .unwrap();

    let connections = Arc::new(ConnectionManager::new(config(&table)));
    let migrator = Migrator::new(connections.clone(), Arc::new(FileMigrationProvider::new(dir.path())));

    let set = migrator.migrate_up().await;
    assert!(matches!(set.error, Some(OrmError::MigrationExecution { ref name, .. }) if name == "0001_broken"));
    assert!(migrator.list().await.unwrap().iter().all(|m| !m.is_executed()));

    let handle = connections.get_handle().await.unwrap();
    handle
        .execute(&format!("DROP TABLE {}", table), &[])
        .await
        .unwrap();
}
