// Catalog: the owned handle on the canonical collection
//
// Everything that mutates the collection goes through here (imports, direct
// edits, soft deletes, remote sync), and every mutation ends with a
// reconciliation pass and a store flush.

use crate::graph::reconcile_relationships;
use crate::merge::propagate_collection_metadata;
use crate::orchestrator::{Analysis, ImportOrchestrator, ImportReport};
use crate::remote::{RemoteSource, SyncError};
use crate::store::{KvBackend, LocalStore, StoreWarning};
use crate::types::{Collection, RawRow, Record, Strategy, SyncState};
use reel_common::{time, Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

/// Label used for rows pulled from the remote collaborator
const REMOTE_SOURCE_LABEL: &str = "remote";

pub struct Catalog<B: KvBackend> {
    collection: Collection,
    store: LocalStore<B>,
    orchestrator: ImportOrchestrator,
    warnings: Vec<StoreWarning>,
}

impl<B: KvBackend> Catalog<B> {
    /// Run the legacy migration check and load the collection
    ///
    /// Never fails; storage problems surface through [`Catalog::warnings`].
    pub async fn open(store: LocalStore<B>) -> Self {
        let mut warnings = Vec::new();

        match store.migrate_legacy().await {
            Ok(Some(warning)) => warnings.push(warning),
            Ok(None) => {}
            Err(e) => warn!("Legacy migration check failed: {}", e),
        }

        let outcome = store.load().await;
        warnings.extend(outcome.warnings);
        info!("Catalog opened with {} records", outcome.collection.live_count());

        Self {
            collection: outcome.collection,
            store,
            orchestrator: ImportOrchestrator::default(),
            warnings,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: ImportOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Live records in collection order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.collection.live()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Record> {
        self.collection.get(id)
    }

    pub fn store(&self) -> &LocalStore<B> {
        &self.store
    }

    pub fn warnings(&self) -> &[StoreWarning] {
        &self.warnings
    }

    /// Drop warnings the user dismissed
    pub fn dismiss_warnings(&mut self) {
        self.warnings.clear();
    }

    /// Direct edit: insert or replace one record
    ///
    /// # Errors
    /// `Error::InvalidInput` for a record without a name; store errors.
    pub async fn upsert(&mut self, mut record: Record) -> Result<Uuid> {
        record.name = record.name.trim().to_string();
        if record.name.is_empty() {
            return Err(Error::InvalidInput("record name is required".to_string()));
        }

        let now = time::now();
        let id = record.id;
        record.is_deleted = false;
        record.last_modified_date = Some(now);

        // A tombstone with this id is revived in place
        match self.collection.find_any_mut(&id) {
            Some(slot) => {
                record.sync_state = slot.sync_state.promoted();
                *slot = record;
            }
            None => {
                record.sync_state = SyncState::New;
                self.collection.push(record);
            }
        }

        propagate_collection_metadata(&mut self.collection, &id, false, now);
        self.flush().await?;
        Ok(id)
    }

    /// Soft-delete a record; returns false when no live record has this id
    pub async fn soft_delete(&mut self, id: &Uuid) -> Result<bool> {
        let now = time::now();
        let Some(record) = self.collection.get_mut(id) else {
            return Ok(false);
        };
        record.is_deleted = true;
        record.touch(now);

        self.flush().await?;
        Ok(true)
    }

    /// Analyze rows against the current collection
    pub fn analyze(&self, source: &str, rows: &[RawRow]) -> Analysis {
        self.orchestrator.analyze(source, rows, &self.collection)
    }

    /// Commit a previous analysis under `strategy`
    pub async fn commit(&mut self, analysis: &Analysis, strategy: Strategy) -> Result<ImportReport> {
        self.orchestrator
            .commit(analysis, &mut self.collection, strategy, &self.store)
            .await
    }

    pub async fn import_batch(
        &mut self,
        source: &str,
        rows: &[RawRow],
        strategy: Strategy,
    ) -> Result<ImportReport> {
        self.orchestrator
            .import_batch(source, rows, strategy, &mut self.collection, &self.store)
            .await
    }

    /// Rebuild relationship lists and save
    pub async fn reconcile(&mut self) -> Result<()> {
        self.flush().await
    }

    /// Import the remote collaborator's rows
    pub async fn pull<R: RemoteSource>(
        &mut self,
        remote: &R,
        strategy: Strategy,
    ) -> std::result::Result<ImportReport, SyncError> {
        let rows = remote.fetch_rows().await?;
        info!("Pulled {} rows from remote", rows.len());
        Ok(self.import_batch(REMOTE_SOURCE_LABEL, &rows, strategy).await?)
    }

    /// Send pending local changes, then mark them clean
    ///
    /// Returns the number of records pushed. Nothing is marked clean when the
    /// remote call fails.
    pub async fn push<R: RemoteSource>(
        &mut self,
        remote: &R,
    ) -> std::result::Result<usize, SyncError> {
        let pending: Vec<Record> = self
            .collection
            .records()
            .iter()
            .filter(|r| r.sync_state != SyncState::Clean)
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        remote.push_records(&pending).await?;

        for record in self.collection.records_mut() {
            if pending.iter().any(|p| p.id == record.id) {
                record.sync_state = SyncState::Clean;
            }
        }
        self.store.save(&self.collection).await?;

        info!("Pushed {} records to remote", pending.len());
        Ok(pending.len())
    }

    async fn flush(&mut self) -> Result<()> {
        reconcile_relationships(&mut self.collection);
        self.store.save(&self.collection).await
    }
}
