//! Attempt resolution.
//!
//! Given the attempt history of one (student, subject) pair and one incoming
//! row, decide whether the row is a new attempt, an in-place revaluation of
//! an existing attempt, or something to skip. Resolution itself is pure; the
//! `HistoryBook` accumulator threads the outcome of each row into the history
//! seen by the next one, so a single upload numbers its own rows correctly.

use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{ExamCategory, ResultRecord, ResultStatus};
use crate::normalize::UNKNOWN_GRADE;

const FAIL_GRADES: &[&str] = &["F", "ABSENT", "AB", "FAIL", UNKNOWN_GRADE];
/// Revaluation outcome meaning "re-evaluated"; pass/fail follows the credits.
const CHANGE_GRADE: &str = "CHANGE";
/// Completion of a non-credit course.
const COMPLETED_GRADE: &str = "COMPLE";

fn is_grade_token(grade: &str) -> bool {
    grade.chars().any(|c| c.is_ascii_alphabetic())
        && grade.chars().all(|c| c.is_ascii_alphabetic() || c == '+')
}

/// PASS/BACKLOG for a grade token. `awarded_credits` only matters for `CHANGE`.
pub fn classify_grade(grade: &str, awarded_credits: f64) -> ResultStatus {
    if !is_grade_token(grade) || FAIL_GRADES.contains(&grade) {
        return ResultStatus::Backlog;
    }
    match grade {
        CHANGE_GRADE if awarded_credits <= 0.0 => ResultStatus::Backlog,
        COMPLETED_GRADE => ResultStatus::Pass,
        _ => ResultStatus::Pass,
    }
}

/// Everything the resolver needs to know about one incoming row.
#[derive(Debug, Clone)]
pub struct AttemptInput<'a> {
    pub student_id: &'a str,
    pub subject_id: &'a str,
    pub subject_credits: f64,
    pub semester: &'a str,
    pub academic_period: &'a str,
    pub exam_category: ExamCategory,
    pub grade: &'a str,
    pub grade_points: i64,
    pub row_credits: Option<f64>,
    pub created_at: &'a str,
}

impl AttemptInput<'_> {
    fn status(&self) -> ResultStatus {
        classify_grade(self.grade, self.row_credits.unwrap_or(0.0))
    }

    fn credits_earned(&self, status: ResultStatus) -> f64 {
        match status {
            ResultStatus::Backlog => 0.0,
            ResultStatus::Pass => self
                .subject_credits
                .max(self.row_credits.unwrap_or(0.0))
                .max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevaluationUpdate {
    pub result_id: String,
    pub grade: String,
    pub grade_points: i64,
    pub credits_earned: f64,
    pub status: ResultStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Same category and academic period already on file.
    Duplicate,
    /// Revaluation with no base attempt to apply to.
    NothingToRevalue,
    /// Revaluation that leaves the grade as it was.
    UnchangedGrade,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::NothingToRevalue => "nothing_to_revalue",
            SkipReason::UnchangedGrade => "unchanged_grade",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Insert {
        record: ResultRecord,
        demote: Vec<String>,
    },
    Revalue(RevaluationUpdate),
    Skip(SkipReason),
}

/// Resolve one row against the history of its (student, subject) pair.
pub fn resolve(history: &[ResultRecord], input: &AttemptInput<'_>) -> Resolution {
    let status = input.status();
    let credits_earned = input.credits_earned(status);

    if let Some(base) = input.exam_category.revaluation_target() {
        let target = history
            .iter()
            .filter(|a| a.exam_category == base)
            .max_by_key(|a| a.attempt_no);
        let Some(target) = target else {
            return Resolution::Skip(SkipReason::NothingToRevalue);
        };
        if target.grade == input.grade {
            return Resolution::Skip(SkipReason::UnchangedGrade);
        }
        return Resolution::Revalue(RevaluationUpdate {
            result_id: target.id.clone(),
            grade: input.grade.to_string(),
            grade_points: input.grade_points,
            credits_earned,
            status,
        });
    }

    let duplicate = history.iter().any(|a| {
        a.exam_category == input.exam_category && a.academic_period == input.academic_period
    });
    if duplicate {
        return Resolution::Skip(SkipReason::Duplicate);
    }

    let attempt_no = match input.exam_category {
        ExamCategory::Supply => history.iter().map(|a| a.attempt_no).max().unwrap_or(1) + 1,
        _ => 1,
    };

    // A cleared subject stays cleared: a later failing sitting is recorded
    // but does not take over as the latest attempt.
    let already_passed = history.iter().any(|a| a.status == ResultStatus::Pass);
    let is_latest = !(already_passed && status.is_backlog());
    let demote = if is_latest {
        history
            .iter()
            .filter(|a| a.is_latest)
            .map(|a| a.id.clone())
            .collect()
    } else {
        Vec::new()
    };

    Resolution::Insert {
        record: ResultRecord {
            id: Uuid::new_v4().to_string(),
            student_id: input.student_id.to_string(),
            subject_id: input.subject_id.to_string(),
            semester: input.semester.to_string(),
            academic_period: input.academic_period.to_string(),
            exam_category: input.exam_category,
            attempt_no,
            grade: input.grade.to_string(),
            grade_points: input.grade_points,
            credits_earned,
            status,
            is_latest,
            created_at: Some(input.created_at.to_string()),
        },
        demote,
    }
}

type PairKey = (String, String);

/// Attempt history per (student id, subject id), snapshotted at batch start
/// and advanced as each row is resolved.
#[derive(Debug, Clone, Default)]
pub struct HistoryBook {
    pairs: HashMap<PairKey, Vec<ResultRecord>>,
}

impl HistoryBook {
    pub fn from_results(results: impl IntoIterator<Item = ResultRecord>) -> Self {
        let mut pairs: HashMap<PairKey, Vec<ResultRecord>> = HashMap::new();
        for r in results {
            pairs
                .entry((r.student_id.clone(), r.subject_id.clone()))
                .or_default()
                .push(r);
        }
        Self { pairs }
    }

    pub fn history(&self, student_id: &str, subject_id: &str) -> &[ResultRecord] {
        self.pairs
            .get(&(student_id.to_string(), subject_id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Resolve a row and fold its outcome into the book.
    pub fn resolve(&mut self, input: &AttemptInput<'_>) -> Resolution {
        let resolution = resolve(self.history(input.student_id, input.subject_id), input);
        self.apply(input.student_id, input.subject_id, &resolution);
        resolution
    }

    fn apply(&mut self, student_id: &str, subject_id: &str, resolution: &Resolution) {
        let entry = self
            .pairs
            .entry((student_id.to_string(), subject_id.to_string()))
            .or_default();
        match resolution {
            Resolution::Insert { record, demote } => {
                for attempt in entry.iter_mut() {
                    if demote.contains(&attempt.id) {
                        attempt.is_latest = false;
                    }
                }
                entry.push(record.clone());
            }
            Resolution::Revalue(update) => {
                if let Some(attempt) = entry.iter_mut().find(|a| a.id == update.result_id) {
                    attempt.grade = update.grade.clone();
                    attempt.grade_points = update.grade_points;
                    attempt.credits_earned = update.credits_earned;
                    attempt.status = update.status;
                }
            }
            Resolution::Skip(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(category: ExamCategory, period: &'a str, grade: &'a str) -> AttemptInput<'a> {
        AttemptInput {
            student_id: "st",
            subject_id: "su",
            subject_credits: 3.0,
            semester: "I",
            academic_period: period,
            exam_category: category,
            grade,
            grade_points: crate::normalize::grade_points_for(grade),
            row_credits: Some(3.0),
            created_at: "2024-01-01T00:00:00Z",
        }
    }

    fn latest_count(book: &HistoryBook) -> usize {
        book.history("st", "su").iter().filter(|a| a.is_latest).count()
    }

    #[test]
    fn grade_classification() {
        for g in ["F", "ABSENT", "AB", "FAIL", "UNKNOWN", "--", "3.5", ""] {
            assert_eq!(classify_grade(g, 3.0), ResultStatus::Backlog, "{}", g);
        }
        for g in ["O", "A+", "A", "B+", "B", "C", "D", "E", "S"] {
            assert_eq!(classify_grade(g, 3.0), ResultStatus::Pass, "{}", g);
        }
        assert_eq!(classify_grade("CHANGE", 0.0), ResultStatus::Backlog);
        assert_eq!(classify_grade("CHANGE", 3.0), ResultStatus::Pass);
        assert_eq!(classify_grade("COMPLE", 0.0), ResultStatus::Pass);
    }

    #[test]
    fn regular_then_supplies_number_attempts() {
        let mut book = HistoryBook::default();
        let Resolution::Insert { record, .. } =
            book.resolve(&input(ExamCategory::Regular, "Nov 2023", "F"))
        else {
            panic!("expected insert");
        };
        assert_eq!(record.attempt_no, 1);
        assert_eq!(record.credits_earned, 0.0);

        for (n, period) in ["Feb 2024", "Jul 2024", "Dec 2024"].iter().enumerate() {
            let Resolution::Insert { record, .. } =
                book.resolve(&input(ExamCategory::Supply, period, "F"))
            else {
                panic!("expected insert");
            };
            assert_eq!(record.attempt_no, n as i64 + 2);
            assert_eq!(latest_count(&book), 1);
        }
    }

    #[test]
    fn supply_without_regular_starts_at_two() {
        let res = resolve(&[], &input(ExamCategory::Supply, "Feb 2024", "B"));
        let Resolution::Insert { record, demote } = res else {
            panic!("expected insert");
        };
        assert_eq!(record.attempt_no, 2);
        assert!(record.is_latest);
        assert!(demote.is_empty());
    }

    #[test]
    fn same_category_and_period_is_a_duplicate() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "A"));
        assert_eq!(
            book.resolve(&input(ExamCategory::Regular, "Nov 2023", "B")),
            Resolution::Skip(SkipReason::Duplicate)
        );
        assert_eq!(book.history("st", "su").len(), 1);
    }

    #[test]
    fn supply_pass_demotes_previous_latest() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "F"));
        let Resolution::Insert { record, demote } =
            book.resolve(&input(ExamCategory::Supply, "Feb 2024", "C"))
        else {
            panic!("expected insert");
        };
        assert!(record.is_latest);
        assert_eq!(demote.len(), 1);
        assert_eq!(record.credits_earned, 3.0);
        assert_eq!(latest_count(&book), 1);
        assert!(book.history("st", "su")[1].is_latest);
    }

    #[test]
    fn backlog_after_pass_is_not_latest() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "B"));
        let Resolution::Insert { record, demote } =
            book.resolve(&input(ExamCategory::Supply, "Feb 2024", "F"))
        else {
            panic!("expected insert");
        };
        assert!(!record.is_latest);
        assert!(demote.is_empty());
        assert_eq!(record.attempt_no, 2);
        assert!(book.history("st", "su")[0].is_latest);
        assert_eq!(latest_count(&book), 1);
    }

    #[test]
    fn revaluation_updates_in_place_only_on_grade_change() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "F"));

        assert_eq!(
            book.resolve(&input(ExamCategory::RegularRevaluation, "Dec 2023", "F")),
            Resolution::Skip(SkipReason::UnchangedGrade)
        );

        let res = book.resolve(&input(ExamCategory::RegularRevaluation, "Dec 2023", "D"));
        let Resolution::Revalue(update) = res else {
            panic!("expected revaluation");
        };
        assert_eq!(update.status, ResultStatus::Pass);
        assert_eq!(update.grade_points, 6);
        assert_eq!(update.credits_earned, 3.0);

        let history = book.history("st", "su");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].grade, "D");
        assert_eq!(history[0].attempt_no, 1);
        assert!(history[0].is_latest);
    }

    #[test]
    fn supply_revaluation_targets_latest_supply_attempt() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "F"));
        book.resolve(&input(ExamCategory::Supply, "Feb 2024", "F"));
        book.resolve(&input(ExamCategory::Supply, "Jul 2024", "F"));
        let target = book.history("st", "su")[2].id.clone();

        let Resolution::Revalue(update) =
            book.resolve(&input(ExamCategory::SupplyRevaluation, "Aug 2024", "E"))
        else {
            panic!("expected revaluation");
        };
        assert_eq!(update.result_id, target);
        assert_eq!(book.history("st", "su").len(), 3);
    }

    #[test]
    fn revaluation_without_base_attempt_is_skipped() {
        let mut book = HistoryBook::default();
        book.resolve(&input(ExamCategory::Regular, "Nov 2023", "F"));
        assert_eq!(
            book.resolve(&input(ExamCategory::SupplyRevaluation, "Aug 2024", "E")),
            Resolution::Skip(SkipReason::NothingToRevalue)
        );
        assert_eq!(
            resolve(&[], &input(ExamCategory::RegularRevaluation, "Dec 2023", "A")),
            Resolution::Skip(SkipReason::NothingToRevalue)
        );
    }

    #[test]
    fn pass_credits_take_the_larger_of_subject_and_row() {
        let mut i = input(ExamCategory::Regular, "Nov 2023", "A");
        i.subject_credits = 4.0;
        i.row_credits = Some(3.0);
        let Resolution::Insert { record, .. } = resolve(&[], &i) else {
            panic!("expected insert");
        };
        assert_eq!(record.credits_earned, 4.0);

        i.subject_credits = 0.0;
        i.row_credits = None;
        let Resolution::Insert { record, .. } = resolve(&[], &i) else {
            panic!("expected insert");
        };
        assert_eq!(record.credits_earned, 0.0);
    }
}
