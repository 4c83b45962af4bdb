use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::db;
use crate::directory;
use crate::error::{EngineError, EngineResult};
use crate::model::ResultRecord;
use crate::normalize::{self, RawResultRow, UploadMetadata};
use crate::resolve::{AttemptInput, HistoryBook, Resolution, RevaluationUpdate};

const PREVIEW_SAMPLE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub total_parsed: usize,
    pub matched_count: usize,
    pub skipped_count: usize,
    pub sample_rows: Vec<RawResultRow>,
}

/// Run the batch filter and extraction without touching the store.
pub fn preview_results(raw_rows: &[Value], batch: Option<&str>) -> PreviewReport {
    let normalized = normalize::normalize_rows(raw_rows, batch);
    PreviewReport {
        total_parsed: normalized.total_parsed,
        matched_count: normalized.matched_count,
        skipped_count: normalized.skipped_count,
        sample_rows: normalized.rows.into_iter().take(PREVIEW_SAMPLE).collect(),
    }
}

struct PendingInsert {
    label: String,
    record: ResultRecord,
}

/// Writes decided for one batch, collected before anything touches the store.
#[derive(Default)]
struct WritePlan {
    inserts: Vec<PendingInsert>,
    pending_index: HashMap<String, usize>,
    demote: Vec<String>,
    revaluations: Vec<RevaluationUpdate>,
}

impl WritePlan {
    fn insert(&mut self, label: String, record: ResultRecord, demote: Vec<String>) {
        for id in demote {
            match self.pending_index.get(&id) {
                Some(&idx) => self.inserts[idx].record.is_latest = false,
                None => self.demote.push(id),
            }
        }
        self.pending_index
            .insert(record.id.clone(), self.inserts.len());
        self.inserts.push(PendingInsert { label, record });
    }

    fn revalue(&mut self, update: RevaluationUpdate) {
        if let Some(&idx) = self.pending_index.get(&update.result_id) {
            let record = &mut self.inserts[idx].record;
            record.grade = update.grade;
            record.grade_points = update.grade_points;
            record.credits_earned = update.credits_earned;
            record.status = update.status;
            return;
        }
        self.revaluations.push(update);
    }
}

/// Ingest one uploaded result sheet.
///
/// Batch-level problems (nothing matched the batch, nothing keyed) reject the
/// upload before any write. Everything else runs inside one transaction:
/// directory reconciliation, a single history snapshot, in-memory resolution,
/// then the planned writes.
pub fn ingest_results(
    conn: &Connection,
    raw_rows: &[Value],
    meta: &UploadMetadata,
    config: &EngineConfig,
) -> EngineResult<IngestReport> {
    let normalized = normalize::normalize_rows(raw_rows, meta.batch.as_deref());
    if normalized.total_parsed > 0 && normalized.matched_count == 0 {
        return Err(EngineError::NoMatchingRows {
            prefix: normalized.prefix.clone().unwrap_or_default(),
            skipped: normalized.skipped_count,
        });
    }
    if normalized.rows.is_empty() {
        return Err(EngineError::NoValidRows {
            diagnostics: normalized.diagnostics,
        });
    }

    let mut report = IngestReport {
        skipped: normalized.skipped_count,
        errors: normalized.diagnostics.clone(),
        ..IngestReport::default()
    };

    let tx = conn.unchecked_transaction()?;
    let (index, _) = directory::reconcile(&tx, &normalized.rows, meta)?;

    let student_ids: Vec<String> = index
        .students
        .values()
        .map(|s| s.id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let snapshot = db::results_for_students(&tx, &student_ids)?;
    debug!(attempts = snapshot.len(), "history snapshot loaded");
    let mut book = HistoryBook::from_results(snapshot);

    let now = chrono::Utc::now().to_rfc3339();
    let mut plan = WritePlan::default();
    for row in &normalized.rows {
        let label = format!("{}/{}", row.roll_number, row.subject_code);
        let Some(student) = index.students.get(&row.roll_number) else {
            report.errors.push(format!("{}: student could not be resolved", label));
            continue;
        };
        let Some(subject) = index.subjects.get(&row.subject_code) else {
            report.errors.push(format!("{}: subject could not be resolved", label));
            continue;
        };

        let input = AttemptInput {
            student_id: &student.id,
            subject_id: &subject.id,
            subject_credits: subject.credits,
            semester: &meta.semester,
            academic_period: &meta.academic_period,
            exam_category: meta.exam_category,
            grade: &row.grade,
            grade_points: row.grade_points,
            row_credits: row.credits,
            created_at: &now,
        };
        match book.resolve(&input) {
            Resolution::Insert { record, demote } => plan.insert(label, record, demote),
            Resolution::Revalue(update) => plan.revalue(update),
            Resolution::Skip(reason) => {
                debug!(row = %label, reason = reason.as_str(), "row skipped");
                report.skipped += 1;
            }
        }
    }

    db::demote_results(&tx, &plan.demote)?;

    for update in &plan.revaluations {
        db::update_result_grade(
            &tx,
            &update.result_id,
            &update.grade,
            update.grade_points,
            update.credits_earned,
            update.status,
        )?;
        report.processed += 1;
    }

    let chunk = config.write_chunk.max(1);
    for (n, batch) in plan.inserts.chunks(chunk).enumerate() {
        for pending in batch {
            match db::insert_result_ignore(&tx, &pending.record) {
                Ok(true) => report.processed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(row = %pending.label, error = %e, "result insert failed");
                    report.errors.push(format!("{}: {}", pending.label, e));
                }
            }
        }
        debug!(chunk = n + 1, rows = batch.len(), "result chunk written");
    }

    tx.commit()?;

    info!(
        category = meta.exam_category.as_str(),
        period = %meta.academic_period,
        semester = %meta.semester,
        processed = report.processed,
        skipped = report.skipped,
        errors = report.errors.len(),
        "results ingested"
    );
    Ok(report)
}
