//! Read-only aggregation over the committed attempt history.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::calc::{self, GpaAccumulator, SemesterGpa};
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::model::{ResultRecord, ResultWithSubject, Student, Subject};
use crate::normalize::batch_prefix;

pub const DEFAULT_TOP_N: usize = 5;
const MOST_FAILED_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilters {
    pub branch: Option<String>,
    pub semester: Option<String>,
    pub batch: Option<String>,
}

fn filter_value(obj: &serde_json::Map<String, Value>, key: &str) -> EngineResult<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("all") {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
        Some(_) => Err(EngineError::bad_params(format!(
            "filters.{} must be a string",
            key
        ))),
    }
}

pub fn parse_filters(raw: Option<&Value>) -> EngineResult<ReportFilters> {
    let Some(raw) = raw else {
        return Ok(ReportFilters::default());
    };
    if raw.is_null() {
        return Ok(ReportFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(EngineError::bad_params("filters must be an object"));
    };
    Ok(ReportFilters {
        branch: filter_value(obj, "branch")?,
        semester: filter_value(obj, "semester")?,
        batch: filter_value(obj, "batch")?,
    })
}

/// A student belongs to `batch` when the stored batch label matches, or when
/// the roll number follows the `<yy>JK` convention for the batch start year.
pub fn batch_matches(student: &Student, batch: &str) -> bool {
    let batch = batch.trim();
    if student.batch.trim().eq_ignore_ascii_case(batch) {
        return true;
    }
    if !batch.starts_with("20") {
        return false;
    }
    match batch_prefix(batch) {
        Some(yy) => student
            .roll_number
            .to_ascii_uppercase()
            .starts_with(&format!("{}JK", yy)),
        None => false,
    }
}

impl ReportFilters {
    fn admits(&self, student: &Student) -> bool {
        if let Some(branch) = self.branch.as_deref() {
            if !student.branch.eq_ignore_ascii_case(branch) {
                return false;
            }
        }
        match self.batch.as_deref() {
            Some(batch) => batch_matches(student, batch),
            None => true,
        }
    }

    fn admits_semester(&self, semester: &str) -> bool {
        self.semester
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(semester))
            .unwrap_or(true)
    }
}

/// The latest attempt of one student at each subject.
struct StudentHistory {
    student: Student,
    latest: Vec<ResultWithSubject>,
}

fn join_subjects(
    results: Vec<ResultRecord>,
    subjects: &HashMap<String, Subject>,
) -> Vec<ResultWithSubject> {
    results
        .into_iter()
        .filter_map(|result| {
            let subject = subjects.get(&result.subject_id)?.clone();
            Some(ResultWithSubject { result, subject })
        })
        .collect()
}

/// Students admitted by `filters` that have at least one attempt on file,
/// ordered by roll number.
fn load_histories(conn: &Connection, filters: &ReportFilters) -> EngineResult<Vec<StudentHistory>> {
    let students: Vec<Student> = db::all_students(conn)?
        .into_iter()
        .filter(|s| filters.admits(s))
        .collect();
    if students.is_empty() {
        return Ok(Vec::new());
    }
    let subjects: HashMap<String, Subject> = db::all_subjects(conn)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();

    let mut by_student: HashMap<String, Vec<ResultWithSubject>> = HashMap::new();
    for r in join_subjects(db::results_for_students(conn, &ids)?, &subjects) {
        by_student
            .entry(r.result.student_id.clone())
            .or_default()
            .push(r);
    }

    let mut out = Vec::new();
    for student in students {
        let Some(attempts) = by_student.remove(&student.id) else {
            continue;
        };
        let latest: Vec<ResultWithSubject> =
            attempts.into_iter().filter(|r| r.result.is_latest).collect();
        out.push(StudentHistory { student, latest });
    }
    Ok(out)
}

// ---- student details ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetails {
    pub student: Student,
    pub results: Vec<ResultWithSubject>,
    pub sgpa_per_semester: Vec<SemesterGpa>,
    pub cgpa: f64,
    pub total_credits: f64,
    pub backlog_count: usize,
}

/// Full attempt history and GPA figures for one student, looked up by id or
/// roll number. `cgpa_upto` caps the CGPA at a semester.
pub fn student_details(
    conn: &Connection,
    key: &str,
    cgpa_upto: Option<&str>,
) -> EngineResult<StudentDetails> {
    let student = match db::student_by_id(conn, key)? {
        Some(s) => s,
        None => db::student_by_roll(conn, &key.trim().to_ascii_uppercase())?
            .ok_or_else(|| EngineError::not_found(format!("student not found: {}", key)))?,
    };

    let subjects: HashMap<String, Subject> = db::all_subjects(conn)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let mut results = join_subjects(
        db::results_for_students(conn, std::slice::from_ref(&student.id))?,
        &subjects,
    );
    results.sort_by(|a, b| {
        let sa = calc::semester_rank(&a.result.semester).unwrap_or(usize::MAX);
        let sb = calc::semester_rank(&b.result.semester).unwrap_or(usize::MAX);
        sa.cmp(&sb)
            .then_with(|| a.subject.subject_code.cmp(&b.subject.subject_code))
            .then_with(|| a.result.attempt_no.cmp(&b.result.attempt_no))
    });

    let latest: Vec<ResultWithSubject> =
        results.iter().filter(|r| r.result.is_latest).cloned().collect();
    let total_credits: f64 = latest
        .iter()
        .filter(|r| !r.result.status.is_backlog())
        .map(|r| r.effective_credits())
        .sum();
    let backlog_count = latest
        .iter()
        .filter(|r| r.result.status.is_backlog())
        .count();

    Ok(StudentDetails {
        sgpa_per_semester: calc::sgpa_per_semester(&latest),
        cgpa: calc::cgpa(&latest, cgpa_upto),
        total_credits,
        backlog_count,
        student,
        results,
    })
}

// ---- backlog listing ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogSubject {
    pub subject_code: String,
    pub subject_name: String,
    pub semester: String,
    pub grade: String,
    pub academic_period: String,
    pub attempt_no: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogEntry {
    pub student: Student,
    pub backlog_count: usize,
    pub subjects: Vec<BacklogSubject>,
}

pub fn backlogs(conn: &Connection, filters: &ReportFilters) -> EngineResult<Vec<BacklogEntry>> {
    let mut out: Vec<BacklogEntry> = load_histories(conn, filters)?
        .into_iter()
        .filter_map(|h| {
            let subjects: Vec<BacklogSubject> = h
                .latest
                .iter()
                .filter(|r| r.result.status.is_backlog())
                .filter(|r| filters.admits_semester(&r.result.semester))
                .map(|r| BacklogSubject {
                    subject_code: r.subject.subject_code.clone(),
                    subject_name: r.subject.subject_name.clone(),
                    semester: r.result.semester.clone(),
                    grade: r.result.grade.clone(),
                    academic_period: r.result.academic_period.clone(),
                    attempt_no: r.result.attempt_no,
                })
                .collect();
            if subjects.is_empty() {
                return None;
            }
            Some(BacklogEntry {
                student: h.student,
                backlog_count: subjects.len(),
                subjects,
            })
        })
        .collect();

    out.sort_by(|a, b| {
        b.backlog_count
            .cmp(&a.backlog_count)
            .then_with(|| a.student.roll_number.cmp(&b.student.roll_number))
    });
    debug!(students = out.len(), "backlog report built");
    Ok(out)
}

// ---- cumulative backlog breakdown ----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterBreakdown {
    pub semester: String,
    pub backlogs: Vec<String>,
    pub backlog_count: usize,
    pub sgpa: f64,
    pub credits: f64,
    pub registered_credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeBacklogEntry {
    pub student: Student,
    pub semesters: Vec<SemesterBreakdown>,
    pub total_backlogs: usize,
    pub cgpa: f64,
    pub total_credits: f64,
}

#[derive(Default)]
struct SemesterTotals {
    backlogs: Vec<String>,
    earned: f64,
    gpa: GpaAccumulator,
}

pub fn cumulative_backlogs(
    conn: &Connection,
    filters: &ReportFilters,
) -> EngineResult<Vec<CumulativeBacklogEntry>> {
    let mut out = Vec::new();
    for h in load_histories(conn, filters)? {
        if h.latest.is_empty() {
            continue;
        }
        let mut by_sem: BTreeMap<String, SemesterTotals> = calc::SEMESTERS
            .iter()
            .map(|s| (s.to_string(), SemesterTotals::default()))
            .collect();
        let mut total_credits = 0.0;
        let mut total_backlogs = 0;
        for r in &h.latest {
            let totals = by_sem.entry(r.result.semester.clone()).or_default();
            totals.gpa.add(r);
            if r.result.status.is_backlog() {
                totals.backlogs.push(r.subject.subject_name.clone());
                total_backlogs += 1;
            } else {
                totals.earned += r.effective_credits();
                total_credits += r.effective_credits();
            }
        }

        let mut labels: Vec<String> = by_sem.keys().cloned().collect();
        calc::sort_semesters(&mut labels);
        let semesters = labels
            .into_iter()
            .filter_map(|label| {
                let totals = by_sem.remove(&label)?;
                Some(SemesterBreakdown {
                    backlog_count: totals.backlogs.len(),
                    backlogs: totals.backlogs,
                    sgpa: totals.gpa.gpa().unwrap_or(0.0),
                    credits: totals.earned,
                    registered_credits: totals.gpa.credits,
                    semester: label,
                })
            })
            .collect();

        out.push(CumulativeBacklogEntry {
            cgpa: calc::cgpa(&h.latest, None),
            student: h.student,
            semesters,
            total_backlogs,
            total_credits,
        });
    }
    Ok(out)
}

// ---- cumulative pass/fail summary ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterTally {
    pub semester: String,
    pub registered: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeSummary {
    pub semesters: Vec<String>,
    pub summary: Vec<SemesterTally>,
    pub passed: Vec<Student>,
    pub failed: Vec<Student>,
}

/// Pass/fail standing over an academic-year band. A student counts once they
/// have a latest result in the band and passes only with no backlog in it.
pub fn cumulative_summary(
    conn: &Connection,
    filters: &ReportFilters,
    year_band: Option<&str>,
) -> EngineResult<CumulativeSummary> {
    let targets = calc::year_band_semesters(year_band);
    let mut summary: Vec<SemesterTally> = targets
        .iter()
        .map(|s| SemesterTally {
            semester: s.to_string(),
            registered: 0,
            passed: 0,
            failed: 0,
        })
        .collect();
    let mut passed = Vec::new();
    let mut failed = Vec::new();

    for h in load_histories(conn, filters)? {
        let mut registered = false;
        let mut clear = true;
        for tally in summary.iter_mut() {
            let semester = tally.semester.clone();
            let mut in_sem = h
                .latest
                .iter()
                .filter(|r| r.result.semester.eq_ignore_ascii_case(&semester))
                .peekable();
            if in_sem.peek().is_none() {
                continue;
            }
            registered = true;
            tally.registered += 1;
            if in_sem.any(|r| r.result.status.is_backlog()) {
                tally.failed += 1;
                clear = false;
            } else {
                tally.passed += 1;
            }
        }
        if registered {
            if clear {
                passed.push(h.student);
            } else {
                failed.push(h.student);
            }
        }
    }

    debug!(
        band = year_band.unwrap_or("All"),
        passed = passed.len(),
        failed = failed.len(),
        "cumulative summary built"
    );
    Ok(CumulativeSummary {
        semesters: targets.iter().map(|s| s.to_string()).collect(),
        summary,
        passed,
        failed,
    })
}

// ---- toppers ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToppersScope {
    Semester(String),
    Year(String),
}

impl ToppersScope {
    fn target_semesters(&self) -> Vec<String> {
        match self {
            ToppersScope::Semester(s) => vec![s.trim().to_ascii_uppercase()],
            ToppersScope::Year(band) => calc::year_band_semesters(Some(band))
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopperEntry {
    pub student: Student,
    pub gpa: f64,
    pub rank: usize,
}

/// Ranked first-attempt performers over a semester or a year band.
///
/// A student is eligible with no latest backlog anywhere, latest results in
/// every target semester, and no latest result inside the band that came from
/// a supplementary attempt. A failed supply that never displaced an earlier
/// pass does not disqualify. Scores use REGULAR and REGULAR_REVALUATION
/// results only.
pub fn toppers(
    conn: &Connection,
    filters: &ReportFilters,
    scope: &ToppersScope,
    top_n: usize,
) -> EngineResult<Vec<TopperEntry>> {
    let targets = scope.target_semesters();
    if targets.is_empty() {
        return Ok(Vec::new());
    }
    let in_band = |r: &ResultWithSubject| {
        targets
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&r.result.semester))
    };

    let mut scored: Vec<(Student, f64)> = Vec::new();
    for h in load_histories(conn, filters)? {
        if h.latest.is_empty() || h.latest.iter().any(|r| r.result.status.is_backlog()) {
            continue;
        }
        let present: HashSet<String> = h
            .latest
            .iter()
            .filter(|r| in_band(*r))
            .map(|r| r.result.semester.to_ascii_uppercase())
            .collect();
        if present.len() < targets.len() {
            continue;
        }
        if h
            .latest
            .iter()
            .any(|r| in_band(r) && r.result.exam_category.is_supply())
        {
            continue;
        }
        let gpa = calc::weighted_gpa(
            h.latest
                .iter()
                .filter(|r| in_band(*r) && r.result.exam_category.is_regular()),
        );
        if let Some(gpa) = gpa {
            scored.push((h.student, gpa));
        }
    }

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.roll_number.cmp(&b.0.roll_number))
    });
    let scores: Vec<f64> = scored.iter().map(|(_, g)| *g).collect();
    let ranks = calc::competition_ranks(&scores);

    Ok(scored
        .into_iter()
        .zip(ranks)
        .filter(|(_, rank)| *rank <= top_n)
        .map(|((student, gpa), rank)| TopperEntry { student, gpa, rank })
        .collect())
}

// ---- analytics ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSubject {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchBacklogs {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub pass_percentage: f64,
    pub most_failed_subjects: Vec<FailedSubject>,
    pub branch_wise_backlogs: Vec<BranchBacklogs>,
    pub total_students: i64,
}

pub fn analytics(conn: &Connection) -> EngineResult<Analytics> {
    let latest = db::all_results(conn, true)?;
    let total_students = db::count_students(conn)?;

    let passed = latest.iter().filter(|r| !r.status.is_backlog()).count();
    let pass_percentage = if latest.is_empty() {
        0.0
    } else {
        calc::round1(passed as f64 * 100.0 / latest.len() as f64)
    };

    let subjects: HashMap<String, Subject> = db::all_subjects(conn)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let branches: HashMap<String, String> = db::all_students(conn)?
        .into_iter()
        .map(|s| (s.id, s.branch))
        .collect();

    let mut by_subject: HashMap<&str, usize> = HashMap::new();
    let mut by_branch: BTreeMap<String, usize> = BTreeMap::new();
    for r in latest.iter().filter(|r| r.status.is_backlog()) {
        *by_subject.entry(r.subject_id.as_str()).or_default() += 1;
        let branch = branches
            .get(&r.student_id)
            .cloned()
            .unwrap_or_else(|| crate::directory::UNKNOWN.to_string());
        *by_branch.entry(branch).or_default() += 1;
    }

    let mut most_failed: Vec<FailedSubject> = by_subject
        .into_iter()
        .filter_map(|(id, count)| {
            subjects.get(id).map(|s| FailedSubject {
                name: s.subject_name.clone(),
                count,
            })
        })
        .collect();
    most_failed.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    most_failed.truncate(MOST_FAILED_LIMIT);

    Ok(Analytics {
        pass_percentage,
        most_failed_subjects: most_failed,
        branch_wise_backlogs: by_branch
            .into_iter()
            .map(|(name, value)| BranchBacklogs { name, value })
            .collect(),
        total_students,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ingest::ingest_results;
    use crate::model::ExamCategory;
    use crate::normalize::UploadMetadata;
    use serde_json::json;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    fn upload(conn: &Connection, category: ExamCategory, period: &str, semester: &str, rows: &[(&str, &str, f64, &str)]) {
        let raw: Vec<Value> = rows
            .iter()
            .map(|(roll, code, credits, grade)| {
                json!({
                    "RollNumber": roll,
                    "StudentName": format!("Student {}", roll),
                    "SubjectCode": code,
                    "SubjectName": format!("Subject {}", code),
                    "Credits": credits,
                    "Grade": grade
                })
            })
            .collect();
        let meta = UploadMetadata {
            exam_category: category,
            academic_period: period.to_string(),
            semester: semester.to_string(),
            branch: "CSE".to_string(),
            batch: Some("2023-2027".to_string()),
            regulation: Some("R22".to_string()),
        };
        ingest_results(conn, &raw, &meta, &EngineConfig::default()).expect("ingest");
    }

    fn student(roll: &str, batch: &str) -> Student {
        Student {
            id: "x".to_string(),
            roll_number: roll.to_string(),
            name: "X".to_string(),
            branch: "CSE".to_string(),
            batch: batch.to_string(),
            regulation: "R22".to_string(),
        }
    }

    #[test]
    fn batch_filter_unions_label_and_roll_convention() {
        assert!(batch_matches(&student("99X1", "2023-2027"), "2023-2027"));
        assert!(batch_matches(&student("23jk1a0501", "Unknown"), "2023-2027"));
        assert!(!batch_matches(&student("22JK1A0501", "Unknown"), "2023-2027"));
        assert!(!batch_matches(&student("23JK1A0501", "Unknown"), "lateral"));
    }

    #[test]
    fn filters_treat_all_as_absent() {
        let f = parse_filters(Some(&json!({ "branch": "All", "semester": "II", "batch": "" })))
            .expect("filters");
        assert_eq!(f.branch, None);
        assert_eq!(f.semester.as_deref(), Some("II"));
        assert_eq!(f.batch, None);
        assert!(parse_filters(Some(&json!({ "branch": 3 }))).is_err());
        assert!(parse_filters(Some(&json!("CSE"))).is_err());
    }

    #[test]
    fn details_report_sgpa_with_backlogs() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "O"), ("23JK1A0501", "PH101", 4.0, "F")],
        );
        let d = student_details(&conn, "23jk1a0501", None).expect("details");
        assert_eq!(d.results.len(), 2);
        assert_eq!(d.sgpa_per_semester[0].sgpa, 4.29);
        assert_eq!(d.cgpa, 4.29);
        assert_eq!(d.total_credits, 3.0);
        assert_eq!(d.backlog_count, 1);

        let by_id = student_details(&conn, &d.student.id, None).expect("by id");
        assert_eq!(by_id.student.roll_number, "23JK1A0501");

        let err = student_details(&conn, "nobody", None).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn backlogs_sorted_by_count_and_filtered_by_semester() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[
                ("23JK1A0501", "MA101", 3.0, "F"),
                ("23JK1A0502", "MA101", 3.0, "F"),
                ("23JK1A0502", "PH101", 3.0, "AB"),
                ("23JK1A0503", "MA101", 3.0, "A"),
            ],
        );
        upload(
            &conn,
            ExamCategory::Regular,
            "May 2024",
            "II",
            &[("23JK1A0501", "CS201", 3.0, "F")],
        );

        let all = backlogs(&conn, &ReportFilters::default()).expect("backlogs");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].backlog_count, 2);
        assert_eq!(all[1].backlog_count, 2);
        assert_eq!(all[0].student.roll_number, "23JK1A0501");

        let sem2 = backlogs(
            &conn,
            &ReportFilters {
                semester: Some("II".to_string()),
                ..ReportFilters::default()
            },
        )
        .expect("backlogs");
        assert_eq!(sem2.len(), 1);
        assert_eq!(sem2[0].subjects[0].subject_code, "CS201");
    }

    #[test]
    fn cleared_backlog_leaves_listing() {
        let conn = open();
        upload(&conn, ExamCategory::Regular, "Nov 2023", "I", &[("23JK1A0501", "MA101", 3.0, "F")]);
        upload(&conn, ExamCategory::Supply, "Feb 2024", "I", &[("23JK1A0501", "MA101", 3.0, "B")]);
        assert!(backlogs(&conn, &ReportFilters::default())
            .expect("backlogs")
            .is_empty());
    }

    #[test]
    fn cumulative_summary_counts_band_only() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "A"), ("23JK1A0502", "MA101", 3.0, "F")],
        );
        upload(&conn, ExamCategory::Regular, "Nov 2024", "III", &[("23JK1A0503", "CS301", 3.0, "F")]);

        let s = cumulative_summary(&conn, &ReportFilters::default(), Some("1st")).expect("summary");
        assert_eq!(s.semesters, vec!["I", "II"]);
        assert_eq!(s.summary[0].registered, 2);
        assert_eq!(s.summary[0].passed, 1);
        assert_eq!(s.summary[0].failed, 1);
        assert_eq!(s.summary[1].registered, 0);
        assert_eq!(s.passed.len(), 1);
        assert_eq!(s.failed.len(), 1);
        assert_eq!(s.failed[0].roll_number, "23JK1A0502");

        let empty = cumulative_summary(&conn, &ReportFilters::default(), Some("9th")).expect("summary");
        assert!(empty.summary.is_empty());
        assert!(empty.passed.is_empty() && empty.failed.is_empty());
    }

    #[test]
    fn cumulative_backlogs_break_down_every_semester() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "O"), ("23JK1A0501", "PH101", 4.0, "F")],
        );
        let rows = cumulative_backlogs(&conn, &ReportFilters::default()).expect("cumulative");
        assert_eq!(rows.len(), 1);
        let entry = &rows[0];
        assert_eq!(entry.semesters.len(), 8);
        assert_eq!(entry.semesters[0].semester, "I");
        assert_eq!(entry.semesters[0].backlogs, vec!["Subject PH101"]);
        assert_eq!(entry.semesters[0].sgpa, 4.29);
        assert_eq!(entry.semesters[0].credits, 3.0);
        assert_eq!(entry.semesters[0].registered_credits, 7.0);
        assert_eq!(entry.semesters[1].sgpa, 0.0);
        assert_eq!(entry.total_backlogs, 1);
        assert_eq!(entry.cgpa, 4.29);
    }

    #[test]
    fn toppers_share_ranks_and_exclude_supply_takers() {
        let conn = open();
        // Scores: 0501 and 0502 at 9.5, 0503 at 9.0, 0504 cleared via supply.
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[
                ("23JK1A0501", "MA101", 2.0, "O"),
                ("23JK1A0501", "PH101", 2.0, "A"),
                ("23JK1A0502", "MA101", 2.0, "A"),
                ("23JK1A0502", "PH101", 2.0, "O"),
                ("23JK1A0503", "MA101", 2.0, "A"),
                ("23JK1A0503", "PH101", 2.0, "A"),
                ("23JK1A0504", "MA101", 2.0, "O"),
                ("23JK1A0504", "PH101", 2.0, "F"),
            ],
        );
        upload(&conn, ExamCategory::Supply, "Feb 2024", "I", &[("23JK1A0504", "PH101", 2.0, "O")]);

        let ranked = toppers(
            &conn,
            &ReportFilters::default(),
            &ToppersScope::Semester("I".to_string()),
            DEFAULT_TOP_N,
        )
        .expect("toppers");
        let view: Vec<(&str, f64, usize)> = ranked
            .iter()
            .map(|t| (t.student.roll_number.as_str(), t.gpa, t.rank))
            .collect();
        assert_eq!(
            view,
            vec![
                ("23JK1A0501", 9.5, 1),
                ("23JK1A0502", 9.5, 1),
                ("23JK1A0503", 9.0, 3),
            ]
        );

        let top1 = toppers(
            &conn,
            &ReportFilters::default(),
            &ToppersScope::Semester("I".to_string()),
            1,
        )
        .expect("toppers");
        assert_eq!(top1.len(), 2);
    }

    #[test]
    fn year_toppers_need_every_semester() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "A"), ("23JK1A0502", "MA101", 3.0, "O")],
        );
        upload(&conn, ExamCategory::Regular, "May 2024", "II", &[("23JK1A0501", "CS201", 3.0, "A")]);

        let ranked = toppers(
            &conn,
            &ReportFilters::default(),
            &ToppersScope::Year("1st".to_string()),
            DEFAULT_TOP_N,
        )
        .expect("toppers");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].student.roll_number, "23JK1A0501");
        assert_eq!(ranked[0].gpa, 9.0);
    }

    #[test]
    fn failed_supply_behind_a_pass_keeps_topper() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "O"), ("23JK1A0502", "MA101", 3.0, "A")],
        );
        upload(&conn, ExamCategory::Supply, "Feb 2024", "I", &[("23JK1A0501", "MA101", 3.0, "F")]);

        let d = student_details(&conn, "23JK1A0501", None).expect("details");
        assert_eq!(d.results.len(), 2);
        assert_eq!(d.backlog_count, 0);

        let ranked = toppers(
            &conn,
            &ReportFilters::default(),
            &ToppersScope::Semester("I".to_string()),
            DEFAULT_TOP_N,
        )
        .expect("toppers");
        let view: Vec<(&str, f64, usize)> = ranked
            .iter()
            .map(|t| (t.student.roll_number.as_str(), t.gpa, t.rank))
            .collect();
        assert_eq!(view, vec![("23JK1A0501", 10.0, 1), ("23JK1A0502", 9.0, 2)]);
    }

    #[test]
    fn year_toppers_exclude_supply_in_second_semester() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[("23JK1A0501", "MA101", 3.0, "A"), ("23JK1A0502", "MA101", 3.0, "O")],
        );
        upload(
            &conn,
            ExamCategory::Regular,
            "May 2024",
            "II",
            &[("23JK1A0501", "CS201", 3.0, "B"), ("23JK1A0502", "CS201", 3.0, "F")],
        );
        upload(&conn, ExamCategory::Supply, "Aug 2024", "II", &[("23JK1A0502", "CS201", 3.0, "O")]);

        let ranked = toppers(
            &conn,
            &ReportFilters::default(),
            &ToppersScope::Year("1st".to_string()),
            DEFAULT_TOP_N,
        )
        .expect("toppers");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].student.roll_number, "23JK1A0501");
        assert_eq!(ranked[0].gpa, 8.5);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn analytics_over_latest_results() {
        let conn = open();
        upload(
            &conn,
            ExamCategory::Regular,
            "Nov 2023",
            "I",
            &[
                ("23JK1A0501", "MA101", 3.0, "A"),
                ("23JK1A0502", "MA101", 3.0, "F"),
                ("23JK1A0503", "MA101", 3.0, "F"),
                ("23JK1A0503", "PH101", 3.0, "B"),
            ],
        );
        let a = analytics(&conn).expect("analytics");
        assert_eq!(a.pass_percentage, 50.0);
        assert_eq!(a.total_students, 3);
        assert_eq!(
            a.most_failed_subjects,
            vec![FailedSubject {
                name: "Subject MA101".to_string(),
                count: 2
            }]
        );
        assert_eq!(
            a.branch_wise_backlogs,
            vec![BranchBacklogs {
                name: "CSE".to_string(),
                value: 2
            }]
        );
    }
}
