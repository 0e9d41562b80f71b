use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Structured failures raised by the engine. Every variant is detected before
/// anything is written.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("score {score} is out of range for max score {max_score}")]
    InvalidScore { score: f64, max_score: f64 },

    #[error("an evaluation named '{name}' already exists for this subject and period")]
    DuplicateEvaluation { name: String },

    #[error("subject is not part of the class curriculum for this school year")]
    SubjectNotAssigned {
        school_year_id: String,
        class_id: String,
        subject_id: String,
    },

    #[error("point budget exceeded: {remaining} points remaining of {budget}")]
    BudgetExceeded { budget: f64, remaining: f64 },

    #[error("enrollment not found")]
    EnrollmentNotFound { enrollment_id: String },

    #[error("grade not found")]
    GradeNotFound { grade_id: String },

    #[error("academic period not found for this school year")]
    PeriodNotFound { period_id: String },

    #[error("school year not found")]
    YearNotFound { school_year_id: String },

    #[error("class not found")]
    ClassNotFound { class: String },

    #[error("subject not found")]
    SubjectNotFound { subject_id: String },

    #[error("student not found")]
    StudentNotFound { student_id: String },

    #[error("student is already enrolled for this school year")]
    DuplicateEnrollment {
        student_id: String,
        school_year_id: String,
    },

    #[error("curriculum entry already exists")]
    DuplicateCurriculumEntry,

    #[error("budget must be a positive number")]
    InvalidBudget { budget: f64 },

    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("ledger was modified concurrently (expected version {expected}, found {current})")]
    VersionConflict { expected: i64, current: i64 },

    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidScore { .. } => "invalid_score",
            Self::DuplicateEvaluation { .. } => "duplicate_evaluation",
            Self::SubjectNotAssigned { .. } => "subject_not_assigned",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::EnrollmentNotFound { .. } => "enrollment_not_found",
            Self::GradeNotFound { .. } => "grade_not_found",
            Self::PeriodNotFound { .. } => "period_not_found",
            Self::YearNotFound { .. } => "year_not_found",
            Self::ClassNotFound { .. } => "class_not_found",
            Self::SubjectNotFound { .. } => "subject_not_found",
            Self::StudentNotFound { .. } => "student_not_found",
            Self::DuplicateEnrollment { .. } => "duplicate_enrollment",
            Self::DuplicateCurriculumEntry => "duplicate_curriculum_entry",
            Self::InvalidBudget { .. } => "invalid_budget",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Invalid(_) => "bad_params",
            Self::Db(_) => "db_error",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidScore { score, max_score } => {
                Some(json!({ "score": score, "maxScore": max_score }))
            }
            Self::DuplicateEvaluation { name } => Some(json!({ "name": name })),
            Self::SubjectNotAssigned {
                school_year_id,
                class_id,
                subject_id,
            } => Some(json!({
                "schoolYearId": school_year_id,
                "classId": class_id,
                "subjectId": subject_id,
            })),
            Self::BudgetExceeded { budget, remaining } => {
                Some(json!({ "budget": budget, "remaining": remaining }))
            }
            Self::EnrollmentNotFound { enrollment_id } => {
                Some(json!({ "enrollmentId": enrollment_id }))
            }
            Self::GradeNotFound { grade_id } => Some(json!({ "gradeId": grade_id })),
            Self::PeriodNotFound { period_id } => Some(json!({ "periodId": period_id })),
            Self::YearNotFound { school_year_id } => {
                Some(json!({ "schoolYearId": school_year_id }))
            }
            Self::ClassNotFound { class } => Some(json!({ "class": class })),
            Self::SubjectNotFound { subject_id } => Some(json!({ "subjectId": subject_id })),
            Self::StudentNotFound { student_id } => Some(json!({ "studentId": student_id })),
            Self::DuplicateEnrollment {
                student_id,
                school_year_id,
            } => Some(json!({ "studentId": student_id, "schoolYearId": school_year_id })),
            Self::InvalidBudget { budget } => Some(json!({ "budget": budget })),
            Self::VersionConflict { expected, current } => {
                Some(json!({ "expectedVersion": expected, "currentVersion": current }))
            }
            Self::DuplicateCurriculumEntry
            | Self::InvalidAmount { .. }
            | Self::Invalid(_)
            | Self::Db(_) => None,
        }
    }
}

pub(crate) fn invalid_amount(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidAmount {
        reason: reason.into(),
    }
}

pub(crate) fn parse_decimal(raw: &str) -> EngineResult<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| invalid_amount(format!("'{}' is not a decimal amount", raw)))
}
