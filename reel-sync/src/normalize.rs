// Record normalization
//
// Turns an arbitrary external row into a well-formed Record. Rich fields may
// arrive as native JSON or as JSON text; both are decoded through the
// `Embedded` classification so every field goes through one code path.

use crate::types::{RawRow, Record, RowError, DEFAULT_CATEGORY, DEFAULT_STATUS};
use reel_common::{time, uuid_utils};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// What to do with a rich field whose embedded JSON text does not parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonPolicy {
    /// Fall back to the field default and report the row as partial
    #[default]
    Recover,
    /// Reject the whole row
    Strict,
}

/// Normalizer output
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: Record,
    /// Rich fields that were malformed and replaced by their default
    pub recovered_fields: Vec<String>,
}

impl Normalized {
    /// Row imported with at least one field defaulted
    pub fn is_partial(&self) -> bool {
        !self.recovered_fields.is_empty()
    }
}

/// Shape of a raw field value before decoding
#[derive(Debug, Clone, Copy, PartialEq)]
enum Embedded<'a> {
    Missing,
    /// Already a JSON structure (array, object, number, bool)
    Structured(&'a Value),
    /// Text that looks like serialized JSON
    Encoded(&'a str),
    /// Any other non-empty text
    Plain(&'a str),
}

impl<'a> Embedded<'a> {
    fn classify(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Embedded::Missing,
            Some(Value::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    Embedded::Missing
                } else if s.starts_with('{') || s.starts_with('[') {
                    Embedded::Encoded(s)
                } else {
                    Embedded::Plain(s)
                }
            }
            Some(other) => Embedded::Structured(other),
        }
    }
}

/// Row normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: JsonPolicy,
}

impl Normalizer {
    pub fn new(policy: JsonPolicy) -> Self {
        Self { policy }
    }

    /// Normalize one row
    ///
    /// # Errors
    /// `RowError::MissingName` when the row has no usable name, and
    /// `RowError::MalformedField` for bad embedded JSON under
    /// [`JsonPolicy::Strict`].
    pub fn normalize(&self, row: &RawRow) -> Result<Normalized, RowError> {
        let name = text(row, &["name", "title"]).ok_or(RowError::MissingName)?;
        let mut recovered = Vec::new();

        let id = text(row, &["id"])
            .and_then(|raw| uuid_utils::parse_v4(&raw))
            .unwrap_or_else(uuid_utils::generate);

        let mut record = Record {
            id,
            name,
            category: text(row, &["category", "type"])
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            status: text(row, &["status"]).unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            year: text(row, &["year"]).unwrap_or_default(),
            country: text(row, &["country"]).unwrap_or_default(),
            language: text(row, &["language"]).unwrap_or_default(),
            description: text(row, &["description", "overview"]).unwrap_or_default(),
            poster: text(row, &["poster", "posterPath", "posterUrl"]).unwrap_or_default(),
            external_id: text(row, &["externalId", "tmdbId"]),
            last_modified_date: timestamp(row, &["lastModifiedDate", "lastModified"]),
            runtime: scalar_payload(row, &["runtime"]),
            collection_id: text(row, &["collectionId"]),
            collection_name: text(row, &["collectionName"]),
            collection_total_parts: count(row, &["collectionTotalParts", "totalParts"]),
            ..Default::default()
        };

        record.genres = self.string_list(row, &["genres", "genre"], "genres", &mut recovered)?;
        record.keywords = self.payload(row, &["keywords"], "keywords", &mut recovered)?;
        record.full_cast = self.payload(row, &["fullCast", "cast"], "full_cast", &mut recovered)?;
        record.director_info =
            self.payload(row, &["directorInfo"], "director_info", &mut recovered)?;
        record.production_companies = self.payload(
            row,
            &["productionCompanies"],
            "production_companies",
            &mut recovered,
        )?;
        record.watch_history =
            self.payload(row, &["watchHistory"], "watchHistory", &mut recovered)?;
        record.related_entries = self.related_entries(row, &mut recovered)?;

        if !recovered.is_empty() {
            debug!(
                "Row '{}' normalized with defaulted fields: {:?}",
                record.name, recovered
            );
        }

        Ok(Normalized {
            record,
            recovered_fields: recovered,
        })
    }

    /// Decode an opaque rich field
    fn payload(
        &self,
        row: &RawRow,
        names: &[&str],
        field: &str,
        recovered: &mut Vec<String>,
    ) -> Result<Option<Value>, RowError> {
        match Embedded::classify(row.get(names)) {
            Embedded::Missing => Ok(None),
            Embedded::Structured(value) => Ok(Some(value.clone())),
            Embedded::Encoded(text) => self.decode(text, field, recovered),
            Embedded::Plain(text) => {
                debug!("Field {} holds plain text {:?}, defaulting", field, text);
                Ok(None)
            }
        }
    }

    /// Decode a list of strings given as an array, JSON text or a
    /// comma/semicolon separated string
    fn string_list(
        &self,
        row: &RawRow,
        names: &[&str],
        field: &str,
        recovered: &mut Vec<String>,
    ) -> Result<Vec<String>, RowError> {
        let decoded;
        let value = match Embedded::classify(row.get(names)) {
            Embedded::Missing => return Ok(Vec::new()),
            Embedded::Plain(text) => return Ok(split_list(text)),
            Embedded::Structured(value) => value,
            Embedded::Encoded(text) => match self.decode(text, field, recovered)? {
                Some(value) => {
                    decoded = value;
                    &decoded
                }
                None => return Ok(Vec::new()),
            },
        };

        Ok(match value {
            Value::Array(items) => items.iter().filter_map(item_text).collect(),
            other => item_text(other).into_iter().collect(),
        })
    }

    /// Candidate adjacency list; existence is checked later by the reconciler
    fn related_entries(
        &self,
        row: &RawRow,
        recovered: &mut Vec<String>,
    ) -> Result<Vec<Uuid>, RowError> {
        let raw = self.string_list(row, &["relatedEntries"], "relatedEntries", recovered)?;

        let mut ids = Vec::with_capacity(raw.len());
        for entry in raw {
            match uuid_utils::parse(&entry) {
                Ok(id) if !ids.contains(&id) => ids.push(id),
                Ok(_) => {}
                Err(_) => debug!("Dropping related entry {:?}: not an id", entry),
            }
        }
        Ok(ids)
    }

    fn decode(
        &self,
        text: &str,
        field: &str,
        recovered: &mut Vec<String>,
    ) -> Result<Option<Value>, RowError> {
        match serde_json::from_str(text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => match self.policy {
                JsonPolicy::Recover => {
                    warn!("Malformed JSON in field {}, using default: {}", field, e);
                    recovered.push(field.to_string());
                    Ok(None)
                }
                JsonPolicy::Strict => Err(RowError::MalformedField {
                    field: field.to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Normalize with the default (recovering) policy
pub fn normalize(row: &RawRow) -> Result<Normalized, RowError> {
    Normalizer::default().normalize(row)
}

/// Scalar coerced to trimmed text; empty text counts as missing
fn text(row: &RawRow, names: &[&str]) -> Option<String> {
    row.get(names).and_then(item_text)
}

fn item_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn scalar_payload(row: &RawRow, names: &[&str]) -> Option<Value> {
    match Embedded::classify(row.get(names)) {
        Embedded::Missing => None,
        Embedded::Structured(value) => Some(value.clone()),
        Embedded::Encoded(text) | Embedded::Plain(text) => Some(Value::String(text.to_string())),
    }
}

fn count(row: &RawRow, names: &[&str]) -> Option<u32> {
    match row.get(names)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp(row: &RawRow, names: &[&str]) -> Option<chrono::DateTime<chrono::Utc>> {
    match row.get(names)? {
        Value::Number(n) => n.as_i64().and_then(time::from_millis),
        Value::String(s) => time::parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncState;
    use serde_json::json;

    #[test]
    fn test_missing_name_is_rejected() {
        let row = RawRow::new().with("year", "2020");
        assert_eq!(normalize(&row), Err(RowError::MissingName));

        let row = RawRow::new().with("name", "   ");
        assert_eq!(normalize(&row), Err(RowError::MissingName));
    }

    #[test]
    fn test_defaults_applied() {
        let row = RawRow::new().with("Name", "  Alpha  ").with("Year", 2020);
        let normalized = normalize(&row).unwrap();
        let record = &normalized.record;

        assert_eq!(record.name, "Alpha");
        assert_eq!(record.year, "2020");
        assert_eq!(record.category, "Movie");
        assert_eq!(record.status, "To Watch");
        assert_eq!(record.sync_state, SyncState::New);
        assert!(!record.is_deleted);
        assert!(record.related_entries.is_empty());
        assert!(!normalized.is_partial());
    }

    #[test]
    fn test_valid_v4_id_is_reused() {
        let id = Uuid::new_v4();
        let row = RawRow::new().with("id", id.to_string()).with("name", "X");
        assert_eq!(normalize(&row).unwrap().record.id, id);
    }

    #[test]
    fn test_invalid_id_is_replaced() {
        let row = RawRow::new().with("id", "42").with("name", "X");
        let record = normalize(&row).unwrap().record;
        assert_eq!(record.id.get_version(), Some(uuid::Version::Random));

        let row = RawRow::new()
            .with("id", "c232ab00-9414-11ec-b3c8-9f6bdeced846")
            .with("name", "X");
        let record = normalize(&row).unwrap().record;
        assert_ne!(record.id.to_string(), "c232ab00-9414-11ec-b3c8-9f6bdeced846");
    }

    #[test]
    fn test_embedded_json_text_is_decoded() {
        let row = RawRow::new()
            .with("name", "X")
            .with("keywords", r#"["heist", "noir"]"#)
            .with("director_info", r#"{"name": "Michael Mann"}"#);
        let record = normalize(&row).unwrap().record;

        assert_eq!(record.keywords, Some(json!(["heist", "noir"])));
        assert_eq!(record.director_info, Some(json!({"name": "Michael Mann"})));
    }

    #[test]
    fn test_structured_values_pass_through() {
        let row = RawRow::new()
            .with("name", "X")
            .with("full_cast", json!([{"name": "Al Pacino"}]))
            .with("production_companies", json!([]));
        let record = normalize(&row).unwrap().record;

        assert_eq!(record.full_cast, Some(json!([{"name": "Al Pacino"}])));
        assert_eq!(record.production_companies, Some(json!([])));
    }

    #[test]
    fn test_plain_text_rich_field_defaults() {
        let row = RawRow::new().with("name", "X").with("keywords", "heist");
        let normalized = normalize(&row).unwrap();
        assert_eq!(normalized.record.keywords, None);
        assert!(!normalized.is_partial());
    }

    #[test]
    fn test_malformed_json_recovers_uniformly() {
        let row = RawRow::new()
            .with("name", "X")
            .with("keywords", "[not json")
            .with("watchHistory", "{broken");
        let normalized = normalize(&row).unwrap();

        assert!(normalized.is_partial());
        assert_eq!(normalized.record.keywords, None);
        assert_eq!(normalized.record.watch_history, None);
        assert_eq!(
            normalized.recovered_fields,
            vec!["keywords".to_string(), "watchHistory".to_string()]
        );
    }

    #[test]
    fn test_malformed_json_strict_rejects_row() {
        let row = RawRow::new().with("name", "X").with("director_info", "{oops");
        let result = Normalizer::new(JsonPolicy::Strict).normalize(&row);
        assert!(matches!(
            result,
            Err(RowError::MalformedField { ref field, .. }) if field == "director_info"
        ));
    }

    #[test]
    fn test_related_entries_from_separated_string() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let row = RawRow::new()
            .with("name", "X")
            .with("relatedEntries", format!(" {} ; {},B, {}", a, b, a));
        let record = normalize(&row).unwrap().record;
        assert_eq!(record.related_entries, vec![a, b]);
    }

    #[test]
    fn test_related_entries_from_json_text_and_array() {
        let a = Uuid::new_v4();
        let row = RawRow::new()
            .with("name", "X")
            .with("relatedEntries", format!(r#"["{}"]"#, a));
        assert_eq!(normalize(&row).unwrap().record.related_entries, vec![a]);

        let row = RawRow::new()
            .with("name", "X")
            .with("relatedEntries", json!([a.to_string(), 7]));
        assert_eq!(normalize(&row).unwrap().record.related_entries, vec![a]);
    }

    #[test]
    fn test_genres_from_string_or_array() {
        let row = RawRow::new().with("name", "X").with("genre", "Crime, Drama");
        assert_eq!(normalize(&row).unwrap().record.genres, vec!["Crime", "Drama"]);

        let row = RawRow::new().with("name", "X").with("genres", json!(["Sci-Fi"]));
        assert_eq!(normalize(&row).unwrap().record.genres, vec!["Sci-Fi"]);
    }

    #[test]
    fn test_external_id_and_collection_fields() {
        let row = RawRow::new()
            .with("name", "X")
            .with("tmdb_id", 949)
            .with("collection_id", "10")
            .with("collection_name", "Saga")
            .with("collection_total_parts", "3");
        let record = normalize(&row).unwrap().record;

        assert_eq!(record.external_id.as_deref(), Some("949"));
        assert_eq!(record.collection_id.as_deref(), Some("10"));
        assert_eq!(record.collection_name.as_deref(), Some("Saga"));
        assert_eq!(record.collection_total_parts, Some(3));
    }

    #[test]
    fn test_last_modified_parsed() {
        let row = RawRow::new()
            .with("name", "X")
            .with("lastModifiedDate", "2024-03-01T12:00:00Z");
        let record = normalize(&row).unwrap().record;
        assert_eq!(record.last_modified_date.unwrap().timestamp(), 1_709_294_400);

        let row = RawRow::new()
            .with("name", "X")
            .with("lastModifiedDate", 1_709_294_400_000_i64);
        let record = normalize(&row).unwrap().record;
        assert_eq!(record.last_modified_date.unwrap().timestamp(), 1_709_294_400);
    }

    #[test]
    fn test_input_sync_flags_ignored() {
        let row = RawRow::new()
            .with("name", "X")
            .with("syncState", "clean")
            .with("isDeleted", true);
        let record = normalize(&row).unwrap().record;
        assert_eq!(record.sync_state, SyncState::New);
        assert!(!record.is_deleted);
    }
}
