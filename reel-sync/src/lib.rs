//! # reel-sync
//!
//! Offline-first reconciliation engine for the Reel movie catalog.
//!
//! Data flow for a batch import:
//! external rows -> [`normalize`] -> [`matcher`] -> [`merge`] -> updated
//! collection -> [`graph`] -> [`store`]. [`orchestrator`] sequences a batch;
//! [`catalog`] owns the collection and also serves direct edits and remote
//! sync.

pub mod catalog;
pub mod graph;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod orchestrator;
pub mod remote;
pub mod store;
pub mod types;

pub use catalog::Catalog;
pub use graph::{reconcile_relationships, ReconcileStats};
pub use matcher::{resolve_match, Resolution};
pub use merge::{merge_one, MergeAction, MergeOutcome};
pub use normalize::{normalize, JsonPolicy, Normalized, Normalizer};
pub use orchestrator::{Analysis, AnalysisSummary, ImportOrchestrator, ImportReport, RowClass};
pub use remote::{RemoteError, RemoteSource, SyncError};
pub use store::{KvBackend, LocalStore, MemoryKvBackend, SqliteKvBackend, StoreWarning};
pub use types::{Collection, MatchKind, RawRow, Record, RowError, Strategy, SyncState};
