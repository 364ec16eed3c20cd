// Match resolution
//
// Links a candidate to at most one live record. Keys are tried in fixed
// priority order and the first key that hits decides; a weaker key is never
// consulted once a stronger one matched.

use crate::types::{Collection, MatchKind, Record};
use uuid::Uuid;

/// Outcome of matching one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Id of the matched live record, `None` for a new record
    pub matched: Option<Uuid>,
    pub kind: MatchKind,
}

impl Resolution {
    fn found(record: &Record, kind: MatchKind) -> Self {
        Self {
            matched: Some(record.id),
            kind,
        }
    }

    pub fn none() -> Self {
        Self {
            matched: None,
            kind: MatchKind::None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Find the existing record a candidate refers to
///
/// Priority: identifier, then external id, then case-insensitive name plus
/// exact year.
pub fn resolve_match(candidate: &Record, collection: &Collection) -> Resolution {
    if let Some(existing) = collection.get(&candidate.id) {
        return Resolution::found(existing, MatchKind::Identifier);
    }

    if let Some(external_id) = candidate.external_id.as_deref() {
        if let Some(existing) = collection.find_by_external_id(external_id) {
            return Resolution::found(existing, MatchKind::ExternalId);
        }
    }

    if let Some(existing) = collection.find_by_name_year(&candidate.name, &candidate.year) {
        return Resolution::found(existing, MatchKind::NameYear);
    }

    Resolution::none()
}
