use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::model::ExamCategory;

pub const UNKNOWN_GRADE: &str = "UNKNOWN";
const REVALUATION_TAG: &str = "(REV)";

const ROLL_KEYS: &[&str] = &["rollnumber", "rollno", "roll"];
const STUDENT_NAME_KEYS: &[&str] = &["studentname", "name"];
const SUBJECT_CODE_KEYS: &[&str] = &["subjectcode", "subcode"];
const SUBJECT_NAME_KEYS: &[&str] = &["subjectname", "subname"];
const CREDITS_KEYS: &[&str] = &["credits", "credit"];
const GRADE_KEYS: &[&str] = &["grade"];
const GRADE_POINTS_KEYS: &[&str] = &["gradepoints", "gradepoint", "points"];
const REGULATION_KEYS: &[&str] = &["regulation", "reg"];

/// Metadata that accompanies every result upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub exam_category: ExamCategory,
    pub academic_period: String,
    pub semester: String,
    pub branch: String,
    pub batch: Option<String>,
    pub regulation: Option<String>,
}

/// One extracted result row after key folding and type coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResultRow {
    pub roll_number: String,
    pub student_name: Option<String>,
    pub subject_code: String,
    pub subject_name: Option<String>,
    pub credits: Option<f64>,
    pub grade: String,
    pub grade_points: i64,
    pub regulation: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub rows: Vec<RawResultRow>,
    pub total_parsed: usize,
    pub matched_count: usize,
    pub skipped_count: usize,
    pub prefix: Option<String>,
    pub diagnostics: Vec<String>,
}

/// Two-digit roll-number prefix for a batch label: `2023-2027` -> `23`.
/// Labels that do not open with a four-digit year have no prefix.
pub fn batch_prefix(batch: &str) -> Option<String> {
    let b = batch.trim();
    let year = b.get(0..4)?;
    if !year.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(year[2..4].to_string())
}

/// Points awarded for a grade token when the extract does not carry them.
pub fn grade_points_for(grade: &str) -> i64 {
    match grade {
        "O" | "S" => 10,
        "A+" | "A" => 9,
        "B" => 8,
        "B+" | "C" => 7,
        "D" => 6,
        "E" => 5,
        _ => 0,
    }
}

pub fn normalize_grade(raw: Option<&str>) -> String {
    let cleaned = raw
        .unwrap_or("")
        .to_ascii_uppercase()
        .replace(REVALUATION_TAG, "")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        UNKNOWN_GRADE.to_string()
    } else {
        cleaned
    }
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn value_text(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

struct FoldedRow {
    fields: Vec<(String, Value)>,
}

impl FoldedRow {
    fn new(obj: &Map<String, Value>) -> Self {
        Self {
            fields: obj
                .iter()
                .map(|(k, v)| (fold_key(k), v.clone()))
                .collect(),
        }
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|want| {
            self.fields
                .iter()
                .filter(|(k, _)| k == want)
                .find_map(|(_, v)| value_text(v))
        })
    }
}

fn parse_number(text: Option<&str>) -> Option<f64> {
    text.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Extract a typed row from one loosely-typed object. Returns an error string
/// when the row cannot be tied to a student or subject.
pub fn extract_row(raw: &Value) -> Result<RawResultRow, String> {
    let Some(obj) = raw.as_object() else {
        return Err("row is not an object".to_string());
    };
    let row = FoldedRow::new(obj);

    let roll_number = row
        .text(ROLL_KEYS)
        .map(|r| r.to_ascii_uppercase())
        .unwrap_or_default();
    let subject_code = row
        .text(SUBJECT_CODE_KEYS)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_default();
    if roll_number.is_empty() {
        return Err("missing roll number".to_string());
    }
    if subject_code.is_empty() {
        return Err(format!("{}: missing subject code", roll_number));
    }

    let grade = normalize_grade(row.text(GRADE_KEYS).as_deref());
    let grade_points = parse_number(row.text(GRADE_POINTS_KEYS).as_deref())
        .map(|p| p.round() as i64)
        .unwrap_or_else(|| grade_points_for(&grade));

    Ok(RawResultRow {
        roll_number,
        student_name: row.text(STUDENT_NAME_KEYS),
        subject_code,
        subject_name: row.text(SUBJECT_NAME_KEYS),
        credits: parse_number(row.text(CREDITS_KEYS).as_deref()),
        grade,
        grade_points,
        regulation: row.text(REGULATION_KEYS),
    })
}

/// Look up a field on a loosely-typed row, ignoring key case and separators.
pub(crate) fn field_text(raw: &Value, keys: &[&str]) -> Option<String> {
    raw.as_object().and_then(|obj| FoldedRow::new(obj).text(keys))
}

fn raw_roll(raw: &Value) -> String {
    field_text(raw, ROLL_KEYS)
        .map(|r| r.to_ascii_uppercase())
        .unwrap_or_default()
}

/// Apply the batch filter and extract every surviving row.
pub fn normalize_rows(raw_rows: &[Value], batch: Option<&str>) -> NormalizedBatch {
    let prefix = batch.and_then(batch_prefix);
    let mut out = NormalizedBatch {
        total_parsed: raw_rows.len(),
        prefix: prefix.clone(),
        ..NormalizedBatch::default()
    };

    for (idx, raw) in raw_rows.iter().enumerate() {
        if let Some(p) = prefix.as_deref() {
            if !raw_roll(raw).starts_with(p) {
                out.skipped_count += 1;
                continue;
            }
        }
        out.matched_count += 1;
        match extract_row(raw) {
            Ok(row) => out.rows.push(row),
            Err(reason) => out.diagnostics.push(format!("row {}: {}", idx + 1, reason)),
        }
    }

    out
}

fn required_meta(obj: &Map<String, Value>, key: &str) -> EngineResult<String> {
    obj.get(key)
        .and_then(value_text)
        .ok_or_else(|| EngineError::bad_params(format!("metadata.{} is required", key)))
}

fn optional_meta(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(value_text)
        .filter(|s| !s.eq_ignore_ascii_case("unknown"))
}

pub fn parse_metadata(raw: Option<&Value>) -> EngineResult<UploadMetadata> {
    let Some(obj) = raw.and_then(|v| v.as_object()) else {
        return Err(EngineError::bad_params("metadata must be an object"));
    };

    let category_raw = required_meta(obj, "examCategory")?;
    let Some(exam_category) = ExamCategory::parse(&category_raw) else {
        return Err(EngineError::bad_params(format!(
            "metadata.examCategory must be one of REGULAR, SUPPLY, REGULAR_REVALUATION, SUPPLY_REVALUATION (got '{}')",
            category_raw
        )));
    };

    Ok(UploadMetadata {
        exam_category,
        academic_period: required_meta(obj, "academicPeriod")?,
        semester: required_meta(obj, "semester")?.to_ascii_uppercase(),
        branch: required_meta(obj, "branch")?.to_ascii_uppercase(),
        batch: optional_meta(obj, "batch"),
        regulation: optional_meta(obj, "regulation").map(|r| r.to_ascii_uppercase()),
    })
}
