//! Curriculum registry: which subjects a class studies in a school year and
//! how many points each is worth.

use super::directory;
use super::error::{EngineError, EngineResult};
use crate::calc::DEFAULT_BUDGET;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumEntry {
    pub id: String,
    pub school_year_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub budget: f64,
}

fn check_budget(budget: f64) -> EngineResult<()> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(EngineError::InvalidBudget { budget });
    }
    Ok(())
}

pub fn budget_for(
    conn: &Connection,
    school_year_id: &str,
    class_id: &str,
    subject_id: &str,
) -> EngineResult<f64> {
    conn.query_row(
        "SELECT budget FROM curriculum_entries
         WHERE school_year_id = ? AND class_id = ? AND subject_id = ?",
        (school_year_id, class_id, subject_id),
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::SubjectNotAssigned {
        school_year_id: school_year_id.to_string(),
        class_id: class_id.to_string(),
        subject_id: subject_id.to_string(),
    })
}

pub fn assign(
    conn: &Connection,
    school_year_id: &str,
    class_id: &str,
    subject_id: &str,
    budget: Option<f64>,
) -> EngineResult<CurriculumEntry> {
    directory::require_year(conn, school_year_id)?;
    directory::class_name(conn, class_id)?;
    directory::require_subject(conn, subject_id)?;
    let budget = budget.unwrap_or(DEFAULT_BUDGET);
    check_budget(budget)?;

    if budget_for(conn, school_year_id, class_id, subject_id).is_ok() {
        return Err(EngineError::DuplicateCurriculumEntry);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO curriculum_entries(id, school_year_id, class_id, subject_id, budget)
         VALUES(?, ?, ?, ?, ?)",
        (&id, school_year_id, class_id, subject_id, budget),
    )?;
    info!(school_year_id, class_id, subject_id, budget, "subject assigned");
    get_entry(conn, school_year_id, class_id, subject_id)
}

pub fn unassign(
    conn: &Connection,
    school_year_id: &str,
    class_id: &str,
    subject_id: &str,
) -> EngineResult<()> {
    let removed = conn.execute(
        "DELETE FROM curriculum_entries
         WHERE school_year_id = ? AND class_id = ? AND subject_id = ?",
        (school_year_id, class_id, subject_id),
    )?;
    if removed == 0 {
        return Err(EngineError::SubjectNotAssigned {
            school_year_id: school_year_id.to_string(),
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
        });
    }
    info!(school_year_id, class_id, subject_id, "subject unassigned");
    Ok(())
}

/// Changes the budget. Grades already recorded are not re-validated, so a
/// lowered budget may sit below the points already handed out.
pub fn set_budget(
    conn: &Connection,
    school_year_id: &str,
    class_id: &str,
    subject_id: &str,
    budget: f64,
) -> EngineResult<CurriculumEntry> {
    check_budget(budget)?;
    let changed = conn.execute(
        "UPDATE curriculum_entries SET budget = ?
         WHERE school_year_id = ? AND class_id = ? AND subject_id = ?",
        (budget, school_year_id, class_id, subject_id),
    )?;
    if changed == 0 {
        return Err(EngineError::SubjectNotAssigned {
            school_year_id: school_year_id.to_string(),
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
        });
    }
    get_entry(conn, school_year_id, class_id, subject_id)
}

fn get_entry(
    conn: &Connection,
    school_year_id: &str,
    class_id: &str,
    subject_id: &str,
) -> EngineResult<CurriculumEntry> {
    list(conn, school_year_id, class_id)?
        .into_iter()
        .find(|e| e.subject_id == subject_id)
        .ok_or_else(|| EngineError::SubjectNotAssigned {
            school_year_id: school_year_id.to_string(),
            class_id: class_id.to_string(),
            subject_id: subject_id.to_string(),
        })
}

/// Subjects assigned to a class for a year, ordered by subject name.
pub fn list(conn: &Connection, school_year_id: &str, class_id: &str) -> EngineResult<Vec<CurriculumEntry>> {
    let mut stmt = conn.prepare(
        "SELECT ce.id, ce.subject_id, s.name, ce.budget
         FROM curriculum_entries ce
         JOIN subjects s ON s.id = ce.subject_id
         WHERE ce.school_year_id = ? AND ce.class_id = ?
         ORDER BY s.name",
    )?;
    let rows = stmt
        .query_map((school_year_id, class_id), |r| {
            Ok(CurriculumEntry {
                id: r.get(0)?,
                school_year_id: school_year_id.to_string(),
                class_id: class_id.to_string(),
                subject_id: r.get(1)?,
                subject_name: r.get(2)?,
                budget: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
