use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamCategory {
    Regular,
    Supply,
    RegularRevaluation,
    SupplyRevaluation,
}

impl ExamCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ExamCategory::Regular => "REGULAR",
            ExamCategory::Supply => "SUPPLY",
            ExamCategory::RegularRevaluation => "REGULAR_REVALUATION",
            ExamCategory::SupplyRevaluation => "SUPPLY_REVALUATION",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let norm = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "REGULAR" => Some(ExamCategory::Regular),
            "SUPPLY" | "SUPPLEMENTARY" => Some(ExamCategory::Supply),
            "REGULAR_REVALUATION" => Some(ExamCategory::RegularRevaluation),
            "SUPPLY_REVALUATION" => Some(ExamCategory::SupplyRevaluation),
            _ => None,
        }
    }

    /// Base category a revaluation targets; `None` for attempt-creating categories.
    pub fn revaluation_target(self) -> Option<ExamCategory> {
        match self {
            ExamCategory::RegularRevaluation => Some(ExamCategory::Regular),
            ExamCategory::SupplyRevaluation => Some(ExamCategory::Supply),
            _ => None,
        }
    }

    pub fn is_supply(self) -> bool {
        matches!(self, ExamCategory::Supply | ExamCategory::SupplyRevaluation)
    }

    pub fn is_regular(self) -> bool {
        matches!(
            self,
            ExamCategory::Regular | ExamCategory::RegularRevaluation
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Pass,
    Backlog,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultStatus::Pass => "PASS",
            ResultStatus::Backlog => "BACKLOG",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASS" => Some(ResultStatus::Pass),
            "BACKLOG" => Some(ResultStatus::Backlog),
            _ => None,
        }
    }

    pub fn is_backlog(self) -> bool {
        self == ResultStatus::Backlog
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_number: String,
    pub name: String,
    pub branch: String,
    pub batch: String,
    pub regulation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub credits: f64,
    pub semester: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub semester: String,
    pub academic_period: String,
    pub exam_category: ExamCategory,
    pub attempt_no: i64,
    pub grade: String,
    pub grade_points: i64,
    pub credits_earned: f64,
    pub status: ResultStatus,
    pub is_latest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A latest-attempt result joined with its subject, the shape every report reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultWithSubject {
    #[serde(flatten)]
    pub result: ResultRecord,
    pub subject: Subject,
}

impl ResultWithSubject {
    /// Credits a result carries in GPA math: the larger of the subject's
    /// credit value and what the attempt recorded as earned.
    pub fn effective_credits(&self) -> f64 {
        self.subject.credits.max(self.result.credits_earned).max(0.0)
    }
}
