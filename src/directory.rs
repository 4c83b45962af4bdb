//! Student and subject directory reconciliation.
//!
//! Every upload first makes sure the students and subjects it references
//! exist, then heals stored values when the incoming row carries strictly
//! better data. Healing is monotonic: a stored value is never replaced by a
//! placeholder, a shorter name or a lower credit value.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::error::EngineResult;
use crate::model::{Student, Subject};
use crate::normalize::{field_text, RawResultRow, UploadMetadata};

pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_SUBJECT: &str = "Unknown Subject";

/// Placeholders extractors emit when a field is not really known.
const PLACEHOLDERS: &[&str] = &["unknown", "tba", "n/a", "-"];

/// True when a value carries real information rather than a placeholder.
pub fn is_informative(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => !PLACEHOLDERS.iter().any(|p| v.eq_ignore_ascii_case(p)),
    }
}

/// Strip the trailing revaluation artifact some result extracts glue onto
/// subject names ("DATA STRUCTURES --- No", "MATHS -- no").
///
/// The artifact is: optional whitespace, two or three dashes, optional
/// whitespace, `No` in any case, end of text.
pub fn clean_subject_name(raw: &str) -> String {
    let trimmed = raw.trim_end();
    let lower = trimmed.to_ascii_lowercase();
    let Some(before_no) = lower.strip_suffix("no") else {
        return trimmed.trim().to_string();
    };
    let before_ws = before_no.trim_end();
    let dashes = before_ws.len() - before_ws.trim_end_matches('-').len();
    if !(2..=3).contains(&dashes) {
        return trimmed.trim().to_string();
    }
    let keep = before_ws.len() - dashes;
    trimmed[..keep].trim().to_string()
}

/// Accepted: any non-empty cleaned name that is not the placeholder and no
/// longer contains a `---` run. Rejected names never reach the store.
pub fn is_acceptable_subject_name(cleaned: &str) -> bool {
    !cleaned.is_empty() && !cleaned.contains("---") && cleaned != UNKNOWN_SUBJECT
}

/// Cleaned incoming name if it should replace `stored`.
pub fn healed_subject_name(stored: &str, incoming: Option<&str>) -> Option<String> {
    let incoming = incoming?;
    if incoming == stored {
        return None;
    }
    let cleaned = clean_subject_name(incoming);
    if is_acceptable_subject_name(&cleaned) && cleaned.len() > stored.len() {
        Some(cleaned)
    } else {
        None
    }
}

pub fn healed_credits(stored: f64, incoming: Option<f64>) -> Option<f64> {
    incoming.filter(|c| c.is_finite() && *c > stored)
}

/// Students and subjects referenced by one upload, keyed by roll number and
/// subject code.
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    pub students: HashMap<String, Student>,
    pub subjects: HashMap<String, Subject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub created_students: usize,
    pub created_subjects: usize,
    pub healed_students: usize,
    pub healed_subjects: usize,
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

fn new_student(row: &RawResultRow, meta: &UploadMetadata) -> Student {
    let name = row
        .student_name
        .as_deref()
        .filter(|n| is_informative(Some(*n)))
        .unwrap_or(UNKNOWN);
    let regulation = row
        .regulation
        .as_deref()
        .filter(|r| is_informative(Some(*r)))
        .or(meta.regulation.as_deref())
        .unwrap_or(UNKNOWN);
    Student {
        id: Uuid::new_v4().to_string(),
        roll_number: row.roll_number.clone(),
        name: name.to_string(),
        branch: meta.branch.clone(),
        batch: meta.batch.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        regulation: regulation.to_ascii_uppercase(),
    }
}

fn new_subject(row: &RawResultRow, meta: &UploadMetadata) -> Subject {
    let name = row
        .subject_name
        .as_deref()
        .map(clean_subject_name)
        .filter(|n| is_acceptable_subject_name(n))
        .unwrap_or_else(|| UNKNOWN_SUBJECT.to_string());
    Subject {
        id: Uuid::new_v4().to_string(),
        subject_code: row.subject_code.clone(),
        subject_name: name,
        credits: row.credits.filter(|c| *c > 0.0).unwrap_or(0.0),
        semester: meta.semester.clone(),
        branch: meta.branch.clone(),
    }
}

/// Make sure every student and subject the rows reference exists, heal what
/// is already stored, and return the resolved directory.
pub fn reconcile(
    conn: &Connection,
    rows: &[RawResultRow],
    meta: &UploadMetadata,
) -> EngineResult<(DirectoryIndex, ReconcileSummary)> {
    let mut summary = ReconcileSummary::default();
    let rolls = distinct(rows.iter().map(|r| r.roll_number.as_str()));
    let codes = distinct(rows.iter().map(|r| r.subject_code.as_str()));

    let mut students: HashMap<String, Student> = db::students_by_rolls(conn, &rolls)?
        .into_iter()
        .map(|s| (s.roll_number.clone(), s))
        .collect();
    let mut subjects: HashMap<String, Subject> = db::subjects_by_codes(conn, &codes)?
        .into_iter()
        .map(|s| (s.subject_code.clone(), s))
        .collect();
    let existing_rolls: HashSet<String> = students.keys().cloned().collect();
    let existing_codes: HashSet<String> = subjects.keys().cloned().collect();

    // Creation: first referencing row wins.
    let mut pending_students = Vec::new();
    let mut pending_subjects = Vec::new();
    let mut planned = HashSet::new();
    for row in rows {
        if !students.contains_key(&row.roll_number) && planned.insert(("s", row.roll_number.clone()))
        {
            pending_students.push(new_student(row, meta));
        }
        if !subjects.contains_key(&row.subject_code)
            && planned.insert(("c", row.subject_code.clone()))
        {
            pending_subjects.push(new_subject(row, meta));
        }
    }
    for s in &pending_students {
        if db::insert_student_ignore(conn, s)? {
            summary.created_students += 1;
        }
    }
    for s in &pending_subjects {
        if db::insert_subject_ignore(conn, s)? {
            summary.created_subjects += 1;
        }
    }
    // Re-read so rows lost to a concurrent insert resolve to the winner.
    if !pending_students.is_empty() {
        let missing: Vec<String> = pending_students.iter().map(|s| s.roll_number.clone()).collect();
        for s in db::students_by_rolls(conn, &missing)? {
            students.insert(s.roll_number.clone(), s);
        }
    }
    if !pending_subjects.is_empty() {
        let missing: Vec<String> = pending_subjects.iter().map(|s| s.subject_code.clone()).collect();
        for s in db::subjects_by_codes(conn, &missing)? {
            subjects.insert(s.subject_code.clone(), s);
        }
    }

    // Healing pass over entities that existed before this upload.
    let mut healed_students = HashSet::new();
    let mut healed_subjects = HashSet::new();
    for row in rows {
        if existing_rolls.contains(&row.roll_number) {
            if let Some(student) = students.get_mut(&row.roll_number) {
                let mut changed = false;
                if let Some(reg) = row.regulation.as_deref().filter(|r| is_informative(Some(*r))) {
                    let reg = reg.to_ascii_uppercase();
                    if student.regulation != reg {
                        student.regulation = reg;
                        changed = true;
                    }
                }
                if !is_informative(Some(student.name.as_str())) {
                    if let Some(name) = row.student_name.as_deref().filter(|n| is_informative(Some(*n))) {
                        student.name = name.to_string();
                        changed = true;
                    }
                }
                if changed {
                    db::update_student(conn, student)?;
                    healed_students.insert(student.id.clone());
                }
            }
        }

        if existing_codes.contains(&row.subject_code) {
            if let Some(subject) = subjects.get_mut(&row.subject_code) {
                if let Some(name) =
                    healed_subject_name(&subject.subject_name, row.subject_name.as_deref())
                {
                    db::update_subject_name(conn, &subject.id, &name)?;
                    subject.subject_name = name;
                    healed_subjects.insert(subject.id.clone());
                }
                if let Some(credits) = healed_credits(subject.credits, row.credits) {
                    db::update_subject_credits(conn, &subject.id, credits)?;
                    subject.credits = credits;
                    healed_subjects.insert(subject.id.clone());
                }
            }
        }
    }
    summary.healed_students = healed_students.len();
    summary.healed_subjects = healed_subjects.len();

    info!(
        students = students.len(),
        subjects = subjects.len(),
        created_students = summary.created_students,
        created_subjects = summary.created_subjects,
        healed_students = summary.healed_students,
        healed_subjects = summary.healed_subjects,
        "directory reconciled"
    );

    Ok((DirectoryIndex { students, subjects }, summary))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

struct DirectoryRow {
    roll_number: String,
    name: Option<String>,
    branch: Option<String>,
    batch: Option<String>,
    regulation: Option<String>,
}

fn directory_row(raw: &Value) -> Option<DirectoryRow> {
    let roll_number = field_text(raw, &["rollnumber", "rollno", "roll"])?.to_ascii_uppercase();
    let informative = |v: Option<String>| v.filter(|s| is_informative(Some(s.as_str())));
    Some(DirectoryRow {
        roll_number,
        name: informative(field_text(raw, &["name", "studentname"])),
        branch: informative(field_text(raw, &["branch"])).map(|b| b.to_ascii_uppercase()),
        batch: informative(field_text(raw, &["batch"])),
        regulation: informative(field_text(raw, &["regulation", "reg"]))
            .map(|r| r.to_ascii_uppercase()),
    })
}

fn merge_field(slot: &mut String, incoming: Option<&String>) -> bool {
    match incoming {
        Some(v) if slot != v => {
            *slot = v.clone();
            true
        }
        _ => false,
    }
}

/// Apply a student directory upload. Informative fields overwrite what is
/// stored; placeholders never do.
pub fn sync_students(conn: &Connection, raw_rows: &[Value]) -> EngineResult<SyncReport> {
    let mut report = SyncReport::default();
    let mut parsed = Vec::new();
    for (idx, raw) in raw_rows.iter().enumerate() {
        match directory_row(raw) {
            Some(row) => parsed.push(row),
            None => report
                .errors
                .push(format!("row {}: skipped row with missing roll number", idx + 1)),
        }
    }

    let rolls = distinct(parsed.iter().map(|r| r.roll_number.as_str()));
    let mut existing: HashMap<String, Student> = db::students_by_rolls(conn, &rolls)?
        .into_iter()
        .map(|s| (s.roll_number.clone(), s))
        .collect();

    for row in parsed {
        report.processed += 1;
        if let Some(student) = existing.get_mut(&row.roll_number) {
            let mut changed = merge_field(&mut student.name, row.name.as_ref());
            changed |= merge_field(&mut student.branch, row.branch.as_ref());
            changed |= merge_field(&mut student.batch, row.batch.as_ref());
            changed |= merge_field(&mut student.regulation, row.regulation.as_ref());
            if changed {
                db::update_student(conn, student)?;
                report.updated += 1;
            }
            continue;
        }

        let student = Student {
            id: Uuid::new_v4().to_string(),
            roll_number: row.roll_number.clone(),
            name: row.name.unwrap_or_else(|| UNKNOWN.to_string()),
            branch: row.branch.unwrap_or_else(|| UNKNOWN.to_string()),
            batch: row.batch.unwrap_or_else(|| UNKNOWN.to_string()),
            regulation: row.regulation.unwrap_or_else(|| UNKNOWN.to_string()),
        };
        if db::insert_student_ignore(conn, &student)? {
            report.created += 1;
        }
        existing.insert(student.roll_number.clone(), student);
    }

    debug!(
        processed = report.processed,
        created = report.created,
        updated = report.updated,
        "student directory synced"
    );
    Ok(report)
}

/// Strip revaluation artifacts from every stored subject name.
pub fn clean_stored_subject_names(conn: &Connection) -> EngineResult<usize> {
    let mut fixed = 0;
    for subject in db::all_subjects(conn)? {
        let cleaned = clean_subject_name(&subject.subject_name);
        if cleaned != subject.subject_name && !cleaned.is_empty() {
            db::update_subject_name(conn, &subject.id, &cleaned)?;
            fixed += 1;
        }
    }
    if fixed > 0 {
        info!(fixed, "cleaned corrupted subject names");
    }
    Ok(fixed)
}
