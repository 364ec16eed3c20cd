// Shared types and data contracts for the reconciliation engine
//
// Every component exchanges these types: the normalizer produces Records,
// the resolver classifies them against a Collection, the merge engine and
// reconciler rewrite the Collection, and the store persists it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Default `category` for records that do not carry one
pub const DEFAULT_CATEGORY: &str = "Movie";

/// Default `status` for records that do not carry one
pub const DEFAULT_STATUS: &str = "To Watch";

// ============================================================================
// Record
// ============================================================================

/// Local change marker used to decide what must be pushed to the remote store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Created locally, never pushed
    #[default]
    New,
    /// Pushed at least once, changed since
    Edited,
    /// In step with the remote store
    Clean,
}

impl SyncState {
    /// State after a content change: `clean` becomes `edited`, `new` stays `new`
    pub fn promoted(self) -> Self {
        match self {
            SyncState::Clean => SyncState::Edited,
            other => other,
        }
    }
}

/// One catalog entry (movie or series)
///
/// Apart from `id`, a stored field with an off-schema value decodes to its
/// default instead of failing the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub id: Uuid,
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub category: String,
    #[serde(deserialize_with = "lenient")]
    pub genres: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: String,
    #[serde(deserialize_with = "lenient")]
    pub year: String,
    #[serde(deserialize_with = "lenient")]
    pub country: String,
    #[serde(deserialize_with = "lenient")]
    pub language: String,
    #[serde(deserialize_with = "lenient")]
    pub description: String,
    #[serde(deserialize_with = "lenient")]
    pub poster: String,

    /// Identifier in a third-party media database
    #[serde(deserialize_with = "lenient")]
    pub external_id: Option<String>,

    /// Ids of linked records; symmetric and closed after reconciliation
    #[serde(deserialize_with = "lenient")]
    pub related_entries: Vec<Uuid>,

    #[serde(deserialize_with = "lenient")]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient")]
    pub sync_state: SyncState,
    #[serde(deserialize_with = "lenient")]
    pub is_deleted: bool,

    // Opaque payloads, carried through merges untouched
    pub runtime: Option<Value>,
    pub keywords: Option<Value>,
    pub full_cast: Option<Value>,
    pub director_info: Option<Value>,
    pub production_companies: Option<Value>,
    pub watch_history: Option<Value>,

    // Collection membership (sagas, trilogies)
    #[serde(deserialize_with = "lenient")]
    pub collection_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub collection_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub collection_total_parts: Option<u32>,
}

/// Decode a field, falling back to its default when the value has the wrong shape
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    match T::deserialize(value) {
        Ok(decoded) => Ok(decoded),
        Err(e) => {
            warn!("Ignoring unreadable stored field: {}", e);
            Ok(T::default())
        }
    }
}

impl Record {
    /// Create a record with a fresh id and the documented defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: reel_common::uuid_utils::generate(),
            name: name.into(),
            category: DEFAULT_CATEGORY.to_string(),
            status: DEFAULT_STATUS.to_string(),
            ..Default::default()
        }
    }

    /// Whether the record takes part in normal reads
    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    /// Record a content change at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified_date = Some(now);
        self.sync_state = self.sync_state.promoted();
    }
}

// ============================================================================
// Collection
// ============================================================================

/// The canonical in-memory collection, owned by whoever drives an operation
///
/// Tombstones (records with `is_deleted`) stay in the vector and in storage
/// until an export/purge path removes them; lookups only see live records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection {
    records: Vec<Record>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// All records, tombstones included
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Live records only
    pub fn live(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_live())
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Live record with the given id
    pub fn get(&self, id: &Uuid) -> Option<&Record> {
        self.live().find(|r| r.id == *id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Record> {
        self.records
            .iter_mut()
            .find(|r| r.is_live() && r.id == *id)
    }

    /// First live record carrying this external id
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Record> {
        if external_id.is_empty() {
            return None;
        }
        self.live()
            .find(|r| r.external_id.as_deref() == Some(external_id))
    }

    /// First live record whose name matches case-insensitively and year exactly
    pub fn find_by_name_year(&self, name: &str, year: &str) -> Option<&Record> {
        let name = name.to_lowercase();
        self.live()
            .find(|r| r.year == year && r.name.to_lowercase() == name)
    }

    /// Ids appearing on more than one live record
    pub fn duplicate_live_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for record in self.live() {
            if !seen.insert(record.id) && !duplicates.contains(&record.id) {
                duplicates.push(record.id);
            }
        }
        duplicates
    }

    /// Whether any record, tombstones included, carries this id
    pub fn contains_id(&self, id: &Uuid) -> bool {
        self.records.iter().any(|r| r.id == *id)
    }

    /// Record with this id, preferring a live one over a tombstone
    pub(crate) fn find_any_mut(&mut self, id: &Uuid) -> Option<&mut Record> {
        let index = self
            .records
            .iter()
            .position(|r| r.is_live() && r.id == *id)
            .or_else(|| self.records.iter().position(|r| r.id == *id))?;
        self.records.get_mut(index)
    }
}

impl FromIterator<Record> for Collection {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Raw input rows
// ============================================================================

/// An external row as handed over by file ingestion or remote sync
///
/// Keys are whatever the source used (`Name`, `name`, `full_cast`,
/// `fullCast`...); [`RawRow::get`] folds case and separators when looking
/// them up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(Map<String, Value>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// First value whose folded key equals one of `names` (in `names` order)
    pub fn get(&self, names: &[&str]) -> Option<&Value> {
        names.iter().find_map(|wanted| {
            let wanted = fold_key(wanted);
            self.0
                .iter()
                .find(|(key, _)| fold_key(key) == wanted)
                .map(|(_, value)| value)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Matching and merging contracts
// ============================================================================

/// How a candidate was linked to an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Identifier,
    ExternalId,
    NameYear,
    None,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchKind::Identifier => "identifier",
            MatchKind::ExternalId => "external id",
            MatchKind::NameYear => "name+year",
            MatchKind::None => "none",
        };
        f.write_str(label)
    }
}

/// Merge policy chosen once per batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Insert unmatched rows, leave matched records alone
    AppendNew,
    /// Replace matched records when the candidate is strictly newer
    #[default]
    UpdateNewer,
    /// Replace matched records unconditionally
    OverwriteAll,
    /// Fill empty allow-listed fields of matched records
    BackfillMissing,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_key(s).as_str() {
            "append" | "appendnew" => Ok(Strategy::AppendNew),
            "update" | "updatenewer" => Ok(Strategy::UpdateNewer),
            "overwrite" | "overwriteall" => Ok(Strategy::OverwriteAll),
            "backfill" | "backfillmissing" => Ok(Strategy::BackfillMissing),
            other => Err(format!("unknown import strategy: {}", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::AppendNew => "append",
            Strategy::UpdateNewer => "update",
            Strategy::OverwriteAll => "overwrite",
            Strategy::BackfillMissing => "backfill",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a single row could not become a candidate
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RowError {
    #[error("row has no name")]
    MissingName,

    #[error("field {field} is malformed: {message}")]
    MalformedField { field: String, message: String },
}
