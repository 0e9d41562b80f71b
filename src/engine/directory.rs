//! Enrollment directory: school years, periods, classes, subjects, students and
//! the enrollments that bind them together.

use super::error::{EngineError, EngineResult};
use super::{finance, now_stamp, settings};
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicPeriod {
    pub id: String,
    pub school_year_id: String,
    pub name: String,
    pub ordinal: i64,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub school_year_id: String,
    pub class_id: String,
    pub class_name: String,
    pub base_tuition: Decimal,
    pub grades_visible: bool,
    pub ledger_version: i64,
}

/// Where an enrollment sits: the key every budget and average lookup needs.
#[derive(Debug, Clone)]
pub struct EnrollmentContext {
    pub student_id: String,
    pub school_year_id: String,
    pub class_id: String,
    pub grades_visible: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewEnrollment {
    pub student_id: String,
    pub school_year_id: String,
    pub class_id: Option<String>,
    pub base_tuition: Option<Decimal>,
}

fn require_name(raw: &str, what: &str) -> EngineResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::Invalid(format!("{} name is required", what)));
    }
    Ok(name.to_string())
}

fn name_taken(conn: &Connection, table: &str, name: &str) -> EngineResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE name = ?", table);
    Ok(conn
        .query_row(&sql, [name], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn create_year(conn: &Connection, name: &str) -> EngineResult<SchoolYear> {
    let name = require_name(name, "school year")?;
    if name_taken(conn, "school_years", &name)? {
        return Err(EngineError::Invalid(format!(
            "school year '{}' already exists",
            name
        )));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO school_years(id, name, created_at) VALUES(?, ?, ?)",
        (&id, &name, now_stamp()),
    )?;
    Ok(SchoolYear { id, name })
}

pub fn list_years(conn: &Connection) -> EngineResult<Vec<SchoolYear>> {
    let mut stmt = conn.prepare("SELECT id, name FROM school_years ORDER BY created_at, rowid")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SchoolYear {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn require_year(conn: &Connection, school_year_id: &str) -> EngineResult<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM school_years WHERE id = ?",
            [school_year_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !exists {
        return Err(EngineError::YearNotFound {
            school_year_id: school_year_id.to_string(),
        });
    }
    Ok(())
}

/// Appends a period to a year. Without an explicit ordinal it goes after the
/// current final period.
pub fn create_period(
    conn: &Connection,
    school_year_id: &str,
    name: &str,
    ordinal: Option<i64>,
) -> EngineResult<AcademicPeriod> {
    require_year(conn, school_year_id)?;
    let name = require_name(name, "period")?;
    let ordinal = match ordinal {
        Some(o) => {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM academic_periods WHERE school_year_id = ? AND ordinal = ?",
                    (school_year_id, o),
                    |r| r.get::<_, i64>(0),
                )
                .optional()?
                .is_some();
            if taken {
                return Err(EngineError::Invalid(format!(
                    "period ordinal {} is already used in this school year",
                    o
                )));
            }
            o
        }
        None => {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(ordinal) FROM academic_periods WHERE school_year_id = ?",
                [school_year_id],
                |r| r.get(0),
            )?;
            max.map(|m| m + 1).unwrap_or(1)
        }
    };
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_periods(id, school_year_id, name, ordinal) VALUES(?, ?, ?, ?)",
        (&id, school_year_id, &name, ordinal),
    )?;
    let is_final = final_period_id(conn, school_year_id)?.as_deref() == Some(id.as_str());
    Ok(AcademicPeriod {
        id,
        school_year_id: school_year_id.to_string(),
        name,
        ordinal,
        is_final,
    })
}

pub fn list_periods(conn: &Connection, school_year_id: &str) -> EngineResult<Vec<AcademicPeriod>> {
    require_year(conn, school_year_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, ordinal FROM academic_periods
         WHERE school_year_id = ?
         ORDER BY ordinal",
    )?;
    let mut periods = stmt
        .query_map([school_year_id], |r| {
            Ok(AcademicPeriod {
                id: r.get(0)?,
                school_year_id: school_year_id.to_string(),
                name: r.get(1)?,
                ordinal: r.get(2)?,
                is_final: false,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(last) = periods.last_mut() {
        last.is_final = true;
    }
    Ok(periods)
}

pub fn final_period_id(conn: &Connection, school_year_id: &str) -> EngineResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM academic_periods
             WHERE school_year_id = ?
             ORDER BY ordinal DESC
             LIMIT 1",
            [school_year_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Loads a period, insisting it belongs to the given school year.
pub fn resolve_period(
    conn: &Connection,
    period_id: &str,
    school_year_id: &str,
) -> EngineResult<AcademicPeriod> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT name, ordinal FROM academic_periods WHERE id = ? AND school_year_id = ?",
            (period_id, school_year_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((name, ordinal)) = row else {
        return Err(EngineError::PeriodNotFound {
            period_id: period_id.to_string(),
        });
    };
    let is_final = final_period_id(conn, school_year_id)?.as_deref() == Some(period_id);
    Ok(AcademicPeriod {
        id: period_id.to_string(),
        school_year_id: school_year_id.to_string(),
        name,
        ordinal,
        is_final,
    })
}

fn create_named(conn: &Connection, table: &str, what: &str, name: &str) -> EngineResult<NamedRow> {
    let name = require_name(name, what)?;
    if name_taken(conn, table, &name)? {
        return Err(EngineError::Invalid(format!("{} '{}' already exists", what, name)));
    }
    let id = Uuid::new_v4().to_string();
    let sql = format!("INSERT INTO {}(id, name) VALUES(?, ?)", table);
    conn.execute(&sql, (&id, &name))?;
    Ok(NamedRow { id, name })
}

fn list_named(conn: &Connection, table: &str) -> EngineResult<Vec<NamedRow>> {
    let sql = format!("SELECT id, name FROM {} ORDER BY name", table);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(NamedRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_class(conn: &Connection, name: &str) -> EngineResult<NamedRow> {
    create_named(conn, "classes", "class", name)
}

pub fn list_classes(conn: &Connection) -> EngineResult<Vec<NamedRow>> {
    list_named(conn, "classes")
}

pub fn class_name(conn: &Connection, class_id: &str) -> EngineResult<String> {
    conn.query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or_else(|| EngineError::ClassNotFound {
        class: class_id.to_string(),
    })
}

pub fn class_id_by_name(conn: &Connection, name: &str) -> EngineResult<String> {
    conn.query_row(
        "SELECT id FROM classes WHERE name = ?",
        [name.trim()],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::ClassNotFound {
        class: name.to_string(),
    })
}

pub fn create_subject(conn: &Connection, name: &str) -> EngineResult<NamedRow> {
    create_named(conn, "subjects", "subject", name)
}

pub fn list_subjects(conn: &Connection) -> EngineResult<Vec<NamedRow>> {
    list_named(conn, "subjects")
}

pub fn require_subject(conn: &Connection, subject_id: &str) -> EngineResult<()> {
    let exists = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !exists {
        return Err(EngineError::SubjectNotFound {
            subject_id: subject_id.to_string(),
        });
    }
    Ok(())
}

pub fn create_student(
    conn: &Connection,
    last_name: &str,
    first_name: &str,
    class_id: Option<&str>,
) -> EngineResult<Student> {
    let last_name = require_name(last_name, "last")?;
    let first_name = first_name.trim().to_string();
    if let Some(cid) = class_id {
        class_name(conn, cid)?;
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, last_name, first_name, class_id, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        (&id, &last_name, &first_name, class_id, now_stamp()),
    )?;
    Ok(Student {
        id,
        last_name,
        first_name,
        class_id: class_id.map(|s| s.to_string()),
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> EngineResult<Student> {
    conn.query_row(
        "SELECT id, last_name, first_name, class_id FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(Student {
                id: r.get(0)?,
                last_name: r.get(1)?,
                first_name: r.get(2)?,
                class_id: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::StudentNotFound {
        student_id: student_id.to_string(),
    })
}

/// Moves a student's persistent class reference.
pub fn set_student_class(conn: &Connection, student_id: &str, class_id: &str) -> EngineResult<()> {
    let changed = conn.execute(
        "UPDATE students SET class_id = ?, updated_at = ? WHERE id = ?",
        (class_id, now_stamp(), student_id),
    )?;
    if changed == 0 {
        return Err(EngineError::StudentNotFound {
            student_id: student_id.to_string(),
        });
    }
    Ok(())
}

/// Registers a student for a school year. The class defaults to the student's
/// class reference and the base tuition to the class default for that year.
pub fn create_enrollment(conn: &Connection, new: &NewEnrollment) -> EngineResult<Enrollment> {
    let student = get_student(conn, &new.student_id)?;
    require_year(conn, &new.school_year_id)?;
    let Some(class_id) = new.class_id.clone().or(student.class_id.clone()) else {
        return Err(EngineError::Invalid(
            "classId is required when the student has no class".to_string(),
        ));
    };
    class_name(conn, &class_id)?;

    let already = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE student_id = ? AND school_year_id = ?",
            (&new.student_id, &new.school_year_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if already {
        return Err(EngineError::DuplicateEnrollment {
            student_id: new.student_id.clone(),
            school_year_id: new.school_year_id.clone(),
        });
    }

    let base_tuition = match new.base_tuition {
        Some(amount) => {
            finance::ensure_non_negative(amount, "base tuition")?;
            amount
        }
        None => settings::default_tuition(conn, &class_id, &new.school_year_id)?,
    };

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO enrollments(id, student_id, school_year_id, class_id, base_tuition, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &new.student_id,
            &new.school_year_id,
            &class_id,
            base_tuition.to_string(),
            now_stamp(),
        ),
    )?;
    if student.class_id.as_deref() != Some(class_id.as_str()) {
        set_student_class(&tx, &new.student_id, &class_id)?;
    }
    tx.commit()?;
    info!(enrollment_id = %id, student_id = %new.student_id, class_id = %class_id, "enrollment created");
    get_enrollment(conn, &id)
}

pub fn resolve_enrollment(conn: &Connection, enrollment_id: &str) -> EngineResult<EnrollmentContext> {
    conn.query_row(
        "SELECT student_id, school_year_id, class_id, grades_visible
         FROM enrollments WHERE id = ?",
        [enrollment_id],
        |r| {
            Ok(EnrollmentContext {
                student_id: r.get(0)?,
                school_year_id: r.get(1)?,
                class_id: r.get(2)?,
                grades_visible: r.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::EnrollmentNotFound {
        enrollment_id: enrollment_id.to_string(),
    })
}

const ENROLLMENT_SELECT: &str = "SELECT e.id, e.student_id, s.last_name, s.first_name,
        e.school_year_id, e.class_id, c.name, e.base_tuition, e.grades_visible, e.ledger_version
     FROM enrollments e
     JOIN students s ON s.id = e.student_id
     JOIN classes c ON c.id = e.class_id";

type EnrollmentRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
);

fn enrollment_from_row(row: EnrollmentRow) -> EngineResult<Enrollment> {
    let (id, student_id, last, first, year, class_id, class_name, tuition, visible, version) = row;
    Ok(Enrollment {
        id,
        student_id,
        student_name: format!("{}, {}", last, first),
        school_year_id: year,
        class_id,
        class_name,
        base_tuition: super::error::parse_decimal(&tuition)?,
        grades_visible: visible != 0,
        ledger_version: version,
    })
}

fn read_enrollment_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<EnrollmentRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
    ))
}

pub fn get_enrollment(conn: &Connection, enrollment_id: &str) -> EngineResult<Enrollment> {
    let sql = format!("{} WHERE e.id = ?", ENROLLMENT_SELECT);
    let row = conn
        .query_row(&sql, [enrollment_id], read_enrollment_row)
        .optional()?
        .ok_or_else(|| EngineError::EnrollmentNotFound {
            enrollment_id: enrollment_id.to_string(),
        })?;
    enrollment_from_row(row)
}

pub fn list_enrollments(
    conn: &Connection,
    school_year_id: &str,
    class_id: Option<&str>,
) -> EngineResult<Vec<Enrollment>> {
    require_year(conn, school_year_id)?;
    let sql = format!(
        "{} WHERE e.school_year_id = ?1 AND (?2 IS NULL OR e.class_id = ?2)
         ORDER BY c.name, s.last_name, s.first_name",
        ENROLLMENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((school_year_id, class_id), read_enrollment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(enrollment_from_row).collect()
}

/// Moves an enrollment to another class within its year. Existing grades stay;
/// only subjects on the new class curriculum appear in period reports.
pub fn transfer_class(conn: &Connection, enrollment_id: &str, class_id: &str) -> EngineResult<Enrollment> {
    let ctx = resolve_enrollment(conn, enrollment_id)?;
    class_name(conn, class_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE enrollments SET class_id = ? WHERE id = ?",
        (class_id, enrollment_id),
    )?;
    set_student_class(&tx, &ctx.student_id, class_id)?;
    tx.commit()?;
    info!(enrollment_id, from = %ctx.class_id, to = %class_id, "enrollment transferred");
    get_enrollment(conn, enrollment_id)
}

pub fn set_grades_visible(conn: &Connection, enrollment_id: &str, visible: bool) -> EngineResult<()> {
    let changed = conn.execute(
        "UPDATE enrollments SET grades_visible = ? WHERE id = ?",
        (visible as i64, enrollment_id),
    )?;
    if changed == 0 {
        return Err(EngineError::EnrollmentNotFound {
            enrollment_id: enrollment_id.to_string(),
        });
    }
    Ok(())
}
