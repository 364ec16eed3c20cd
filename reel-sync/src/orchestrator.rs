// Import orchestration
//
// Sequences normalizer -> resolver -> merge engine over a batch, then
// reconciles the relationship graph once and flushes the store. Analysis is
// read-only so the user can review counts before committing.

use crate::graph::reconcile_relationships;
use crate::matcher::resolve_match;
use crate::merge::{
    collection_metadata_changed, merge_one, propagate_collection_metadata, MergeAction,
};
use crate::normalize::{Normalized, Normalizer};
use crate::store::{KvBackend, LocalStore};
use crate::types::{Collection, MatchKind, RawRow, RowError, Strategy};
use reel_common::{time, uuid_utils, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Classification of one analyzed row
#[derive(Debug, Clone, PartialEq)]
pub enum RowClass {
    New,
    Matched(MatchKind),
    Invalid(RowError),
}

/// One analyzed row
#[derive(Debug, Clone, PartialEq)]
pub struct RowAnalysis {
    /// Position in the input batch
    pub index: usize,
    pub class: RowClass,
    /// Record matched at analysis time
    pub matched: Option<Uuid>,
    /// Normalized candidate, absent for invalid rows
    pub candidate: Option<Normalized>,
}

impl RowAnalysis {
    pub fn is_partial(&self) -> bool {
        self.candidate.as_ref().is_some_and(Normalized::is_partial)
    }
}

/// Counts shown to the user before committing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub total: usize,
    pub new: usize,
    pub matched_by_identifier: usize,
    pub matched_by_external_id: usize,
    pub matched_by_name_year: usize,
    pub invalid: usize,
    /// Valid rows with at least one defaulted field
    pub partial: usize,
}

impl AnalysisSummary {
    pub fn matched(&self) -> usize {
        self.matched_by_identifier + self.matched_by_external_id + self.matched_by_name_year
    }
}

/// Analysis of a batch, replayed by [`ImportOrchestrator::commit`]
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// File name or remote label the rows came from
    pub source: String,
    pub rows: Vec<RowAnalysis>,
    pub summary: AnalysisSummary,
}

/// Counts after a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub appended: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub partial: usize,
    /// Other records whose collection labels were refreshed
    pub propagated: usize,
}

/// Batch import driver
#[derive(Debug, Clone, Default)]
pub struct ImportOrchestrator {
    normalizer: Normalizer,
}

impl ImportOrchestrator {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    /// Normalize and classify every row without touching the collection
    pub fn analyze(&self, source: &str, rows: &[RawRow], collection: &Collection) -> Analysis {
        let mut summary = AnalysisSummary {
            total: rows.len(),
            ..Default::default()
        };

        let rows: Vec<RowAnalysis> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let candidate = match self.normalizer.normalize(row) {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        debug!("Row {} of {} is invalid: {}", index, source, e);
                        summary.invalid += 1;
                        return RowAnalysis {
                            index,
                            class: RowClass::Invalid(e),
                            matched: None,
                            candidate: None,
                        };
                    }
                };

                let resolution = resolve_match(&candidate.record, collection);
                let class = match resolution.kind {
                    MatchKind::None => {
                        summary.new += 1;
                        RowClass::New
                    }
                    kind => {
                        match kind {
                            MatchKind::Identifier => summary.matched_by_identifier += 1,
                            MatchKind::ExternalId => summary.matched_by_external_id += 1,
                            _ => summary.matched_by_name_year += 1,
                        }
                        RowClass::Matched(kind)
                    }
                };
                if candidate.is_partial() {
                    summary.partial += 1;
                }

                RowAnalysis {
                    index,
                    class,
                    matched: resolution.matched,
                    candidate: Some(candidate),
                }
            })
            .collect();

        info!(
            "Analyzed {} rows from {}: {} new, {} matched, {} invalid",
            summary.total,
            source,
            summary.new,
            summary.matched(),
            summary.invalid
        );

        Analysis {
            source: source.to_string(),
            rows,
            summary,
        }
    }

    /// Apply an analysis to the live collection and persist it
    ///
    /// Every candidate is matched again against the collection as it is now,
    /// so rows committed earlier in the batch are seen by later rows and
    /// changes made since analysis are respected.
    ///
    /// # Errors
    /// Only store failures; the collection is already updated in memory when
    /// the save fails, so the caller can retry the save.
    pub async fn commit<B: KvBackend>(
        &self,
        analysis: &Analysis,
        collection: &mut Collection,
        strategy: Strategy,
        store: &LocalStore<B>,
    ) -> Result<ImportReport> {
        let now = time::now();
        let mut report = ImportReport::default();
        let mut relabelled: Vec<Uuid> = Vec::new();

        for row in &analysis.rows {
            let Some(candidate) = &row.candidate else {
                report.skipped += 1;
                continue;
            };

            let resolution = resolve_match(&candidate.record, collection);
            if resolution.matched != row.matched {
                debug!(
                    "Row {} match changed since analysis ({:?} -> {:?})",
                    row.index, row.matched, resolution.matched
                );
            }

            let outcome = merge_one(
                &candidate.record,
                resolution.matched.and_then(|id| collection.get(&id)),
                resolution.kind,
                strategy,
                now,
            );

            match outcome.action {
                MergeAction::Appended => {
                    let mut record = outcome.result;
                    if collection.contains_id(&record.id) {
                        // Id belongs to a tombstone; deleted records stay deleted
                        debug!("Row {} reuses a deleted id, assigning a new one", row.index);
                        record.id = uuid_utils::generate();
                    }
                    collection.push(record);
                    report.appended += 1;
                }
                MergeAction::Updated => {
                    let id = outcome.result.id;
                    if let Some(slot) = collection.get_mut(&id) {
                        if collection_metadata_changed(slot, &outcome.result)
                            && !relabelled.contains(&id)
                        {
                            relabelled.push(id);
                        }
                        *slot = outcome.result;
                    }
                    report.updated += 1;
                }
                MergeAction::Unchanged => report.unchanged += 1,
            }

            if candidate.is_partial() {
                report.partial += 1;
            }
        }

        // Siblings only follow records whose membership labels this batch changed
        let fill_blanks_only = strategy == Strategy::BackfillMissing;
        for id in &relabelled {
            report.propagated +=
                propagate_collection_metadata(collection, id, fill_blanks_only, now);
        }

        // Once per batch: partial closures mid-batch would be wrong
        reconcile_relationships(collection);

        if let Err(e) = store.save(collection).await {
            warn!("Import of {} applied but not saved: {}", analysis.source, e);
            return Err(e);
        }

        info!(
            "Committed {} with strategy {}: {} appended, {} updated, {} unchanged, {} skipped",
            analysis.source,
            strategy,
            report.appended,
            report.updated,
            report.unchanged,
            report.skipped
        );
        Ok(report)
    }

    /// Analyze and commit in one go
    pub async fn import_batch<B: KvBackend>(
        &self,
        source: &str,
        rows: &[RawRow],
        strategy: Strategy,
        collection: &mut Collection,
        store: &LocalStore<B>,
    ) -> Result<ImportReport> {
        let analysis = self.analyze(source, rows, collection);
        self.commit(&analysis, collection, strategy, store).await
    }
}
