//! Tests for SQLite initialization of the local cache

use reel_common::db::init::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("reel.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reel.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO kv_store (key, value) VALUES ('k', 'v')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    // Second open must keep existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = 'k'")
        .fetch_optional(&pool2)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_kv_store_table_is_empty_on_creation() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("reel.db");

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
