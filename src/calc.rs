use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::ResultWithSubject;

/// Semester labels in program order.
pub const SEMESTERS: [&str; 8] = ["I", "II", "III", "IV", "V", "VI", "VII", "VIII"];

/// Position of a semester label in program order; `None` for labels outside I..VIII.
pub fn semester_rank(label: &str) -> Option<usize> {
    let l = label.trim();
    SEMESTERS.iter().position(|s| s.eq_ignore_ascii_case(l))
}

fn semester_order(a: &str, b: &str) -> Ordering {
    match (semester_rank(a), semester_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Half-up rounding to 1 decimal.
pub fn round1(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Semesters covered by an academic-year band. `None`/`All` cover the whole
/// program; an unrecognised band covers nothing.
pub fn year_band_semesters(band: Option<&str>) -> Vec<&'static str> {
    let Some(b) = band.map(|b| b.trim().to_ascii_lowercase()) else {
        return SEMESTERS.to_vec();
    };
    match b.as_str() {
        "" | "all" => SEMESTERS.to_vec(),
        "1st" | "1" | "first" => vec!["I", "II"],
        "2nd" | "2" | "second" => vec!["III", "IV"],
        "3rd" | "3" | "third" => vec!["V", "VI"],
        "4th" | "4" | "fourth" => vec!["VII", "VIII"],
        _ => Vec::new(),
    }
}

/// Credit-weighted grade-point accumulator. Backlogs add their credits to the
/// denominator with zero points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpaAccumulator {
    pub credits: f64,
    pub credit_points: f64,
}

impl GpaAccumulator {
    pub fn add(&mut self, r: &ResultWithSubject) {
        let credits = r.effective_credits();
        if credits <= 0.0 {
            return;
        }
        let points = if r.result.status.is_backlog() {
            0.0
        } else {
            r.result.grade_points as f64
        };
        self.credits += credits;
        self.credit_points += credits * points;
    }

    pub fn gpa(&self) -> Option<f64> {
        if self.credits > 0.0 {
            Some(round2(self.credit_points / self.credits))
        } else {
            None
        }
    }
}

pub fn weighted_gpa<'a, I>(results: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a ResultWithSubject>,
{
    let mut acc = GpaAccumulator::default();
    for r in results {
        acc.add(r);
    }
    acc.gpa()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGpa {
    pub semester: String,
    pub sgpa: f64,
    pub credits: f64,
}

/// SGPA for every semester that has credit-bearing latest results, in program order.
pub fn sgpa_per_semester(latest: &[ResultWithSubject]) -> Vec<SemesterGpa> {
    let mut by_sem: HashMap<&str, GpaAccumulator> = HashMap::new();
    for r in latest {
        by_sem.entry(r.result.semester.as_str()).or_default().add(r);
    }
    let mut out: Vec<SemesterGpa> = by_sem
        .into_iter()
        .filter_map(|(sem, acc)| {
            acc.gpa().map(|sgpa| SemesterGpa {
                semester: sem.to_string(),
                sgpa,
                credits: acc.credits,
            })
        })
        .collect();
    out.sort_by(|a, b| semester_order(&a.semester, &b.semester));
    out
}

/// CGPA over latest results up to and including `cutoff`. Labels outside
/// I..VIII only count when there is no cutoff.
pub fn cgpa(latest: &[ResultWithSubject], cutoff: Option<&str>) -> f64 {
    let limit = cutoff.map(semester_rank);
    weighted_gpa(latest.iter().filter(|r| match limit {
        None => true,
        Some(None) => false,
        Some(Some(max)) => semester_rank(&r.result.semester).is_some_and(|s| s <= max),
    }))
    .unwrap_or(0.0)
}

/// Standard competition ranks for scores already sorted descending:
/// `[9.5, 9.5, 9.0]` ranks `[1, 1, 3]`.
pub fn competition_ranks(sorted_desc: &[f64]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(sorted_desc.len());
    for (i, score) in sorted_desc.iter().enumerate() {
        if i > 0 && sorted_desc[i - 1] == *score {
            let prev = ranks[i - 1];
            ranks.push(prev);
        } else {
            ranks.push(i + 1);
        }
    }
    ranks
}

pub fn sort_semesters(labels: &mut [String]) {
    labels.sort_by(|a, b| semester_order(a, b));
}
