// Local durable store
//
// The whole collection lives as one JSON blob under a fixed key. The store
// is a cache, not a query engine: reads and writes are all-or-nothing on that
// key, and the backend only needs atomic single-key get/put/delete.

use crate::types::Collection;
use async_trait::async_trait;
use reel_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Key holding the serialized collection
pub const COLLECTION_KEY: &str = "reel.collection.v2";

/// Single-array key written by the previous app generation
pub const LEGACY_COLLECTION_KEY: &str = "reel.collection";

/// Set once the legacy key has been inspected
pub const LEGACY_CHECKED_KEY: &str = "reel.migration.legacy_checked";

/// Atomic single-key storage
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

// ============================================================================
// Backends
// ============================================================================

/// Key/value table in the local SQLite database
#[derive(Debug, Clone)]
pub struct SqliteKvBackend {
    pool: SqlitePool,
}

impl SqliteKvBackend {
    /// Wrap a pool whose database already has the `kv_store` table
    /// (see `reel_common::db::init_database`)
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvBackend for SqliteKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-process backend for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryKvBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Conditions the caller must show the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreWarning {
    /// Stored blob did not parse; it was deleted and the collection reset
    Corrupted { detail: String },
    /// Backend could not be read; an empty collection was returned
    StorageUnavailable { detail: String },
    /// Data from the previous app generation was discarded
    LegacyDataDiscarded,
}

impl StoreWarning {
    /// Warnings that stay on screen until the user dismisses them
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            StoreWarning::Corrupted { .. } | StoreWarning::StorageUnavailable { .. }
        )
    }
}

impl fmt::Display for StoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWarning::Corrupted { detail } => write!(
                f,
                "Saved catalog data was corrupted and has been reset ({})",
                detail
            ),
            StoreWarning::StorageUnavailable { detail } => write!(
                f,
                "Local storage is unavailable; changes cannot be loaded ({})",
                detail
            ),
            StoreWarning::LegacyDataDiscarded => f.write_str(
                "Data from an older version was found and removed; please re-import your catalog",
            ),
        }
    }
}

/// Result of [`LocalStore::load`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    /// Everything stored; tombstones are kept so later saves carry them
    /// forward, and `Collection::live` hides them from reads
    pub collection: Collection,
    pub warnings: Vec<StoreWarning>,
}

/// Whole-collection persistence over a key/value backend
#[derive(Debug)]
pub struct LocalStore<B: KvBackend> {
    backend: B,
}

impl<B: KvBackend> LocalStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist the whole collection, tombstones included
    ///
    /// # Errors
    /// `Error::InvalidInput` if live records share an id (nothing is
    /// written); backend errors propagate so the caller can retry or warn
    /// that changes are unsaved.
    pub async fn save(&self, collection: &Collection) -> Result<()> {
        let duplicates = collection.duplicate_live_ids();
        if !duplicates.is_empty() {
            return Err(Error::InvalidInput(format!(
                "refusing to save collection with duplicate ids: {:?}",
                duplicates
            )));
        }

        let blob = serde_json::to_string(collection)?;
        self.backend.put(COLLECTION_KEY, &blob).await?;
        debug!(
            "Saved {} records ({} bytes)",
            collection.len(),
            blob.len()
        );
        Ok(())
    }

    /// Load the stored collection
    ///
    /// Never fails: corruption and unreadable storage both yield an empty
    /// collection plus a warning.
    pub async fn load(&self) -> LoadOutcome {
        let blob = match self.backend.get(COLLECTION_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return LoadOutcome::default(),
            Err(e) => {
                warn!("Local storage unavailable: {}", e);
                return LoadOutcome {
                    collection: Collection::new(),
                    warnings: vec![StoreWarning::StorageUnavailable {
                        detail: e.to_string(),
                    }],
                };
            }
        };

        match serde_json::from_str::<Collection>(&blob) {
            Ok(collection) => {
                debug!(
                    "Loaded {} records ({} tombstones)",
                    collection.len(),
                    collection.len() - collection.live_count()
                );
                LoadOutcome {
                    collection,
                    warnings: Vec::new(),
                }
            }
            Err(e) => {
                warn!("Stored collection is corrupted, resetting: {}", e);
                if let Err(delete_err) = self.backend.delete(COLLECTION_KEY).await {
                    warn!("Failed to clear corrupted collection: {}", delete_err);
                }
                LoadOutcome {
                    collection: Collection::new(),
                    warnings: vec![StoreWarning::Corrupted {
                        detail: e.to_string(),
                    }],
                }
            }
        }
    }

    /// Discard the previous generation's collection, once
    ///
    /// Legacy data is never merged. Returns a warning when something was
    /// discarded so the user knows to re-import.
    pub async fn migrate_legacy(&self) -> Result<Option<StoreWarning>> {
        if self.backend.get(LEGACY_CHECKED_KEY).await?.is_some() {
            return Ok(None);
        }

        let found = self.backend.get(LEGACY_COLLECTION_KEY).await?.is_some();
        if found {
            self.backend.delete(LEGACY_COLLECTION_KEY).await?;
            info!("Discarded legacy collection; manual re-import required");
        }
        self.backend.put(LEGACY_CHECKED_KEY, "1").await?;

        Ok(found.then_some(StoreWarning::LegacyDataDiscarded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    /// Backend whose every call fails
    struct BrokenBackend;

    #[async_trait]
    impl KvBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Storage("disk offline".to_string()))
        }
        async fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Storage("disk offline".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::Storage("disk offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_load_empty_store() {
        let store = LocalStore::new(MemoryKvBackend::new());
        let outcome = store.load().await;
        assert!(outcome.collection.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_keeps_tombstones_hidden() {
        let store = LocalStore::new(MemoryKvBackend::new());
        let live = Record::new("Live");
        let mut dead = Record::new("Dead");
        dead.is_deleted = true;
        let collection = Collection::from_records(vec![live.clone(), dead.clone()]);

        store.save(&collection).await.unwrap();
        let blob = store.backend().get(COLLECTION_KEY).await.unwrap().unwrap();
        assert!(blob.contains("Dead"));

        let outcome = store.load().await;
        assert_eq!(outcome.collection, collection);
        assert_eq!(outcome.collection.live().collect::<Vec<_>>(), vec![&live]);
        assert!(outcome.collection.get(&dead.id).is_none());

        // Saving what was loaded does not lose the tombstone
        store.save(&outcome.collection).await.unwrap();
        assert_eq!(store.load().await.collection, collection);
    }

    #[tokio::test]
    async fn test_off_schema_record_does_not_wipe_collection() {
        let store = LocalStore::new(MemoryKvBackend::new());
        let good = Record::new("Heat");
        let odd_id = uuid::Uuid::new_v4();
        let blob = serde_json::json!([
            good,
            {"id": odd_id, "name": "Ronin", "collectionTotalParts": -1, "syncState": "synced"}
        ]);
        store
            .backend()
            .put(COLLECTION_KEY, &blob.to_string())
            .await
            .unwrap();

        let outcome = store.load().await;
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.collection.live_count(), 2);
        assert_eq!(outcome.collection.get(&good.id), Some(&good));
        assert_eq!(outcome.collection.get(&odd_id).unwrap().name, "Ronin");
    }

    #[tokio::test]
    async fn test_corrupted_blob_resets_and_clears_key() {
        let store = LocalStore::new(MemoryKvBackend::new());
        store.backend().put(COLLECTION_KEY, "{not json").await.unwrap();

        let outcome = store.load().await;
        assert!(outcome.collection.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(outcome.warnings[0], StoreWarning::Corrupted { .. }));
        assert!(outcome.warnings[0].is_persistent());
        assert_eq!(store.backend().get(COLLECTION_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_live_ids() {
        let store = LocalStore::new(MemoryKvBackend::new());
        let a = Record::new("A");
        let collection = Collection::from_records(vec![a.clone(), a]);

        let result = store.save(&collection).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.backend().get(COLLECTION_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_propagates_backend_failure() {
        let store = LocalStore::new(BrokenBackend);
        let result = store.save(&Collection::new()).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_load_with_unavailable_storage_is_empty_with_warning() {
        let store = LocalStore::new(BrokenBackend);
        let outcome = store.load().await;
        assert!(outcome.collection.is_empty());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [StoreWarning::StorageUnavailable { .. }]
        ));
    }

    #[tokio::test]
    async fn test_legacy_migration_runs_once() {
        let store = LocalStore::new(MemoryKvBackend::new());
        store
            .backend()
            .put(LEGACY_COLLECTION_KEY, r#"[{"title":"old"}]"#)
            .await
            .unwrap();

        let warning = store.migrate_legacy().await.unwrap();
        assert_eq!(warning, Some(StoreWarning::LegacyDataDiscarded));
        assert_eq!(store.backend().get(LEGACY_COLLECTION_KEY).await.unwrap(), None);
        // Never merged into the current collection
        assert!(store.load().await.collection.is_empty());

        // A legacy key reappearing later is left alone
        store.backend().put(LEGACY_COLLECTION_KEY, "[]").await.unwrap();
        assert_eq!(store.migrate_legacy().await.unwrap(), None);
        assert!(store.backend().get(LEGACY_COLLECTION_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_legacy_migration_without_legacy_data() {
        let store = LocalStore::new(MemoryKvBackend::new());
        assert_eq!(store.migrate_legacy().await.unwrap(), None);
        assert!(store.backend().get(LEGACY_CHECKED_KEY).await.unwrap().is_some());
    }

    #[test]
    fn test_legacy_warning_is_dismissable() {
        assert!(!StoreWarning::LegacyDataDiscarded.is_persistent());
        assert!(StoreWarning::LegacyDataDiscarded.to_string().contains("re-import"));
    }
}
