// Remote sync collaborator seam
//
// Cloud sync is reached through an opaque request/response API. The engine
// only needs rows to import and a place to send pending local changes; retry
// policy stays with whoever implements this trait or calls the catalog.

use crate::types::{RawRow, Record};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the remote collaborator, with a human-readable message
#[derive(Debug, Clone, Error)]
#[error("remote sync failed: {message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error from an operation that talks to both the remote and the local store
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] reel_common::Error),
}

/// Remote store of catalog rows
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Rows in the same shape as imported file rows
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, RemoteError>;

    /// Send records carrying local changes (tombstones included)
    async fn push_records(&self, records: &[Record]) -> Result<(), RemoteError>;
}
