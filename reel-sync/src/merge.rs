// Merge strategies
//
// Decides what a matched (or unmatched) candidate turns into under the
// batch strategy. Conflicts are settled here deterministically from the
// strategy and timestamps; nothing in this module asks the user.

use crate::types::{Collection, MatchKind, Record, Strategy, SyncState};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// What a merge did to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Candidate inserted as a new record
    Appended,
    /// Existing record rewritten
    Updated,
    /// Nothing to persist
    Unchanged,
}

/// Result of merging one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Record as it should now be stored (the untouched existing record when
    /// nothing changed)
    pub result: Record,
    pub changed: bool,
    pub action: MergeAction,
}

impl MergeOutcome {
    fn appended(result: Record) -> Self {
        Self {
            result,
            changed: true,
            action: MergeAction::Appended,
        }
    }

    fn updated(result: Record) -> Self {
        Self {
            result,
            changed: true,
            action: MergeAction::Updated,
        }
    }

    fn unchanged(result: Record) -> Self {
        Self {
            result,
            changed: false,
            action: MergeAction::Unchanged,
        }
    }
}

/// Merge one candidate under `strategy`
///
/// `matched` is the live record the resolver linked the candidate to, if
/// any. The existing id always survives an update.
pub fn merge_one(
    candidate: &Record,
    matched: Option<&Record>,
    kind: MatchKind,
    strategy: Strategy,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let Some(existing) = matched else {
        let mut inserted = candidate.clone();
        inserted.sync_state = SyncState::New;
        inserted.is_deleted = false;
        inserted.last_modified_date = Some(now);
        return MergeOutcome::appended(inserted);
    };

    let outcome = match strategy {
        Strategy::AppendNew => MergeOutcome::unchanged(existing.clone()),
        Strategy::UpdateNewer => {
            if is_newer(candidate.last_modified_date, existing.last_modified_date) {
                replace(existing, candidate, now)
            } else {
                MergeOutcome::unchanged(existing.clone())
            }
        }
        Strategy::OverwriteAll => replace(existing, candidate, now),
        Strategy::BackfillMissing => {
            let mut result = existing.clone();
            let filled = backfill(&mut result, candidate);
            if filled.is_empty() {
                MergeOutcome::unchanged(existing.clone())
            } else {
                debug!("Backfilled {:?} on '{}'", filled, result.name);
                result.touch(now);
                MergeOutcome::updated(result)
            }
        }
    };

    debug!(
        "Merged '{}' ({} match, {}): {:?}",
        candidate.name, kind, strategy, outcome.action
    );
    outcome
}

/// Candidate strictly newer than the existing record
///
/// An undated candidate is never newer; an undated record is older than any
/// dated candidate.
fn is_newer(candidate: Option<DateTime<Utc>>, existing: Option<DateTime<Utc>>) -> bool {
    match (candidate, existing) {
        (Some(candidate), Some(existing)) => candidate > existing,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Candidate content over the existing identity
fn replace(existing: &Record, candidate: &Record, now: DateTime<Utc>) -> MergeOutcome {
    let mut result = candidate.clone();
    result.id = existing.id;
    result.is_deleted = false;
    result.sync_state = existing.sync_state;
    result.last_modified_date = existing.last_modified_date;

    if result == *existing {
        return MergeOutcome::unchanged(existing.clone());
    }

    result.touch(now);
    MergeOutcome::updated(result)
}

/// Emptiness as the backfill rule sees it
trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for Value {
    fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

impl Blank for u32 {
    fn is_blank(&self) -> bool {
        false
    }
}

impl<T: Blank> Blank for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().map_or(true, Blank::is_blank)
    }
}

/// Copy allow-listed candidate values into blank fields of `existing`
///
/// Returns the names of the fields filled. Populated fields are never
/// touched, and a blank candidate value (empty array included) never counts
/// as present.
fn backfill(existing: &mut Record, candidate: &Record) -> Vec<&'static str> {
    let mut filled = Vec::new();

    macro_rules! fill {
        ($($field:ident),+ $(,)?) => {
            $(
                if existing.$field.is_blank() && !candidate.$field.is_blank() {
                    existing.$field = candidate.$field.clone();
                    filled.push(stringify!($field));
                }
            )+
        };
    }

    fill!(
        runtime,
        keywords,
        collection_id,
        collection_name,
        collection_total_parts,
        director_info,
        full_cast,
        production_companies,
        related_entries,
        genres,
        country,
        language,
    );

    filled
}

/// Copy collection name and part count from `source_id` to every other live
/// record in the same external collection
///
/// With `fill_blanks_only`, siblings keep any name or part count they already
/// have. Returns the number of records changed.
pub fn propagate_collection_metadata(
    collection: &mut Collection,
    source_id: &Uuid,
    fill_blanks_only: bool,
    now: DateTime<Utc>,
) -> usize {
    let Some(source) = collection.get(source_id) else {
        return 0;
    };
    let Some(collection_id) = source.collection_id.clone() else {
        return 0;
    };
    let name = source.collection_name.clone();
    let total_parts = source.collection_total_parts;

    let mut touched = 0;
    for record in collection.records_mut() {
        if !record.is_live()
            || record.id == *source_id
            || record.collection_id.as_deref() != Some(collection_id.as_str())
        {
            continue;
        }

        let mut changed = false;
        if name.is_some()
            && record.collection_name != name
            && (!fill_blanks_only || record.collection_name.is_blank())
        {
            record.collection_name = name.clone();
            changed = true;
        }
        if total_parts.is_some()
            && record.collection_total_parts != total_parts
            && (!fill_blanks_only || record.collection_total_parts.is_none())
        {
            record.collection_total_parts = total_parts;
            changed = true;
        }

        if changed {
            record.touch(now);
            touched += 1;
        }
    }

    if touched > 0 {
        debug!(
            "Propagated collection {} metadata to {} records",
            collection_id, touched
        );
    }
    touched
}

/// Whether `after` differs from `before` in the fields propagation copies
pub fn collection_metadata_changed(before: &Record, after: &Record) -> bool {
    before.collection_id != after.collection_id
        || before.collection_name != after.collection_name
        || before.collection_total_parts != after.collection_total_parts
}
