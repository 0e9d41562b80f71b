//! Grade ledger. Every write that can grow the points handed out for an
//! (enrollment, subject, period) runs under an immediate transaction, so the
//! budget sum it checks cannot move before the row lands.

use super::error::{EngineError, EngineResult};
use super::{curriculum, directory, now_stamp};
use crate::calc::{self, ScoreLine, ScoreTotals};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub enrollment_id: String,
    pub subject_id: String,
    pub period_id: String,
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub graded_on: String,
}

#[derive(Debug, Clone)]
pub struct GradeInput {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub graded_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub period_id: String,
    pub budget: f64,
    pub average: f64,
    pub graded_max: f64,
    pub grade_count: usize,
}

fn begin_immediate(conn: &Connection) -> EngineResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn check_score(score: f64, max_score: f64) -> EngineResult<()> {
    if !calc::score_in_range(score, max_score) {
        return Err(EngineError::InvalidScore { score, max_score });
    }
    Ok(())
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn check_unique_name(
    conn: &Connection,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
    name: &str,
    exclude_grade_id: Option<&str>,
) -> EngineResult<()> {
    let wanted = normalize_name(name);
    let mut stmt = conn.prepare(
        "SELECT id, name FROM grades
         WHERE enrollment_id = ? AND subject_id = ? AND period_id = ?",
    )?;
    let mut rows = stmt.query((enrollment_id, subject_id, period_id))?;
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        if exclude_grade_id == Some(id.as_str()) {
            continue;
        }
        let existing: String = row.get(1)?;
        if normalize_name(&existing) == wanted {
            return Err(EngineError::DuplicateEvaluation {
                name: name.trim().to_string(),
            });
        }
    }
    Ok(())
}

fn graded_max_sum(
    conn: &Connection,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
    exclude_grade_id: Option<&str>,
) -> EngineResult<f64> {
    let sum: f64 = conn.query_row(
        "SELECT COALESCE(SUM(max_score), 0) FROM grades
         WHERE enrollment_id = ?1 AND subject_id = ?2 AND period_id = ?3
           AND (?4 IS NULL OR id <> ?4)",
        (enrollment_id, subject_id, period_id, exclude_grade_id),
        |r| r.get(0),
    )?;
    Ok(sum)
}

fn check_budget(existing: f64, added: f64, budget: f64) -> EngineResult<()> {
    if !calc::fits_budget(existing, added, budget) {
        return Err(EngineError::BudgetExceeded {
            budget,
            remaining: calc::remaining_allowance(existing, budget),
        });
    }
    Ok(())
}

pub fn record_grade(
    conn: &Connection,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
    input: &GradeInput,
) -> EngineResult<Grade> {
    check_score(input.score, input.max_score)?;

    let tx = begin_immediate(conn)?;
    check_unique_name(&tx, enrollment_id, subject_id, period_id, &input.name, None)?;
    let ctx = directory::resolve_enrollment(&tx, enrollment_id)?;
    directory::resolve_period(&tx, period_id, &ctx.school_year_id)?;
    let budget = curriculum::budget_for(&tx, &ctx.school_year_id, &ctx.class_id, subject_id)?;
    let existing = graded_max_sum(&tx, enrollment_id, subject_id, period_id, None)?;
    if let Err(e) = check_budget(existing, input.max_score, budget) {
        warn!(
            enrollment_id,
            subject_id,
            period_id,
            existing,
            added = input.max_score,
            budget,
            "grade rejected: budget exceeded"
        );
        return Err(e);
    }

    let grade = Grade {
        id: Uuid::new_v4().to_string(),
        enrollment_id: enrollment_id.to_string(),
        subject_id: subject_id.to_string(),
        period_id: period_id.to_string(),
        name: input.name.trim().to_string(),
        score: input.score,
        max_score: input.max_score,
        graded_on: graded_on(input),
    };
    tx.execute(
        "INSERT INTO grades(id, enrollment_id, subject_id, period_id, name, score, max_score, graded_on, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &grade.id,
            &grade.enrollment_id,
            &grade.subject_id,
            &grade.period_id,
            &grade.name,
            grade.score,
            grade.max_score,
            &grade.graded_on,
            now_stamp(),
        ),
    )?;
    tx.commit()?;
    info!(
        grade_id = %grade.id,
        enrollment_id,
        subject_id,
        period_id,
        max_score = grade.max_score,
        "grade recorded"
    );
    Ok(grade)
}

fn graded_on(input: &GradeInput) -> String {
    input
        .graded_on
        .unwrap_or_else(|| chrono::Local::now().date_naive())
        .format("%Y-%m-%d")
        .to_string()
}

/// Edits a grade. The budget is re-checked only when the max score grows;
/// shrinking or renaming stays possible even when the subject is at capacity.
pub fn update_grade(conn: &Connection, grade_id: &str, input: &GradeInput) -> EngineResult<Grade> {
    check_score(input.score, input.max_score)?;

    let tx = begin_immediate(conn)?;
    let current = get_grade(&tx, grade_id)?;
    check_unique_name(
        &tx,
        &current.enrollment_id,
        &current.subject_id,
        &current.period_id,
        &input.name,
        Some(grade_id),
    )?;
    if input.max_score > current.max_score {
        let ctx = directory::resolve_enrollment(&tx, &current.enrollment_id)?;
        let budget =
            curriculum::budget_for(&tx, &ctx.school_year_id, &ctx.class_id, &current.subject_id)?;
        let others = graded_max_sum(
            &tx,
            &current.enrollment_id,
            &current.subject_id,
            &current.period_id,
            Some(grade_id),
        )?;
        if let Err(e) = check_budget(others, input.max_score, budget) {
            warn!(
                grade_id,
                others,
                requested = input.max_score,
                budget,
                "grade update rejected: budget exceeded"
            );
            return Err(e);
        }
    }

    let graded_on = match input.graded_on {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => current.graded_on.clone(),
    };
    tx.execute(
        "UPDATE grades SET name = ?, score = ?, max_score = ?, graded_on = ? WHERE id = ?",
        (input.name.trim(), input.score, input.max_score, &graded_on, grade_id),
    )?;
    tx.commit()?;
    info!(grade_id, max_score = input.max_score, "grade updated");
    Ok(Grade {
        name: input.name.trim().to_string(),
        score: input.score,
        max_score: input.max_score,
        graded_on,
        ..current
    })
}

pub fn delete_grade(conn: &Connection, grade_id: &str) -> EngineResult<()> {
    let removed = conn.execute("DELETE FROM grades WHERE id = ?", [grade_id])?;
    if removed == 0 {
        return Err(EngineError::GradeNotFound {
            grade_id: grade_id.to_string(),
        });
    }
    info!(grade_id, "grade deleted");
    Ok(())
}

pub fn get_grade(conn: &Connection, grade_id: &str) -> EngineResult<Grade> {
    conn.query_row(
        "SELECT id, enrollment_id, subject_id, period_id, name, score, max_score, graded_on
         FROM grades WHERE id = ?",
        [grade_id],
        read_grade,
    )
    .optional()?
    .ok_or_else(|| EngineError::GradeNotFound {
        grade_id: grade_id.to_string(),
    })
}

fn read_grade(r: &rusqlite::Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        enrollment_id: r.get(1)?,
        subject_id: r.get(2)?,
        period_id: r.get(3)?,
        name: r.get(4)?,
        score: r.get(5)?,
        max_score: r.get(6)?,
        graded_on: r.get(7)?,
    })
}

pub fn list_grades(
    conn: &Connection,
    enrollment_id: &str,
    period_id: Option<&str>,
    subject_id: Option<&str>,
) -> EngineResult<Vec<Grade>> {
    directory::resolve_enrollment(conn, enrollment_id)?;
    let mut stmt = conn.prepare(
        "SELECT g.id, g.enrollment_id, g.subject_id, g.period_id, g.name, g.score, g.max_score, g.graded_on
         FROM grades g
         JOIN academic_periods p ON p.id = g.period_id
         WHERE g.enrollment_id = ?1
           AND (?2 IS NULL OR g.period_id = ?2)
           AND (?3 IS NULL OR g.subject_id = ?3)
         ORDER BY p.ordinal, g.subject_id, g.graded_on, g.created_at",
    )?;
    let rows = stmt
        .query_map((enrollment_id, period_id, subject_id), read_grade)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Score totals per subject for one period (or the whole year when `period_id`
/// is `None`).
pub fn totals_by_subject(
    conn: &Connection,
    enrollment_id: &str,
    period_id: Option<&str>,
) -> EngineResult<Vec<(String, ScoreTotals)>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, score, max_score FROM grades
         WHERE enrollment_id = ?1 AND (?2 IS NULL OR period_id = ?2)
         ORDER BY subject_id",
    )?;
    let mut rows = stmt.query((enrollment_id, period_id))?;
    let mut out: Vec<(String, ScoreTotals)> = Vec::new();
    while let Some(row) = rows.next()? {
        let subject_id: String = row.get(0)?;
        let line = ScoreLine {
            score: row.get(1)?,
            max_score: row.get(2)?,
        };
        match out.last_mut() {
            Some((sid, t)) if *sid == subject_id => t.add(line),
            _ => {
                let mut t = ScoreTotals::default();
                t.add(line);
                out.push((subject_id, t));
            }
        }
    }
    Ok(out)
}

pub fn subject_average(
    conn: &Connection,
    enrollment_id: &str,
    subject_id: &str,
    period_id: &str,
) -> EngineResult<SubjectAverage> {
    let ctx = directory::resolve_enrollment(conn, enrollment_id)?;
    let budget = curriculum::budget_for(conn, &ctx.school_year_id, &ctx.class_id, subject_id)?;
    let t = totals_by_subject(conn, enrollment_id, Some(period_id))?
        .into_iter()
        .find(|(sid, _)| sid == subject_id)
        .map(|(_, t)| t)
        .unwrap_or_default();
    Ok(SubjectAverage {
        subject_id: subject_id.to_string(),
        period_id: period_id.to_string(),
        budget,
        average: calc::subject_average(&t, budget),
        graded_max: t.max_sum,
        grade_count: t.count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::Fixture;
    use std::thread;

    fn input(name: &str, score: f64, max_score: f64) -> GradeInput {
        GradeInput {
            name: name.to_string(),
            score,
            max_score,
            graded_on: None,
        }
    }

    #[test]
    fn budget_scenario_rejects_then_accepts_within_epsilon() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);

        record_grade(&conn, e, s, p, &input("Midterm", 50.0, 60.0)).expect("first");
        let err = record_grade(&conn, e, s, p, &input("Quiz", 40.0, 50.0)).unwrap_err();
        match err {
            EngineError::BudgetExceeded { remaining, .. } => assert!((remaining - 40.0).abs() < 1e-9),
            other => panic!("expected budget_exceeded, got {other:?}"),
        }
        record_grade(&conn, e, s, p, &input("Quiz", 30.0, 40.0)).expect("fills budget");
        record_grade(&conn, e, s, p, &input("Bonus", 0.0, 0.0005)).expect("within epsilon");
    }

    #[test]
    fn rejection_paths() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);

        assert!(matches!(
            record_grade(&conn, e, s, p, &input("A", 11.0, 10.0)),
            Err(EngineError::InvalidScore { .. })
        ));
        assert!(matches!(
            record_grade(&conn, e, s, p, &input("A", 0.0, 0.0)),
            Err(EngineError::InvalidScore { .. })
        ));
        record_grade(&conn, e, s, p, &input("Essay", 5.0, 10.0)).expect("essay");
        assert!(matches!(
            record_grade(&conn, e, s, p, &input("  ESSAY ", 5.0, 10.0)),
            Err(EngineError::DuplicateEvaluation { .. })
        ));
        assert!(matches!(
            record_grade(&conn, e, &fx.unassigned_subject_id, p, &input("Essay", 5.0, 10.0)),
            Err(EngineError::SubjectNotAssigned { .. })
        ));
        assert!(matches!(
            record_grade(&conn, "missing", s, p, &input("X", 5.0, 10.0)),
            Err(EngineError::EnrollmentNotFound { .. })
        ));
    }

    #[test]
    fn period_from_another_year_is_not_found() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let next_year = directory::create_year(&conn, "2026-2027").expect("year");
        let foreign = directory::create_period(&conn, &next_year.id, "Term 1", None).expect("period");

        let err = record_grade(
            &conn,
            &fx.enrollment_id,
            &fx.subject_id,
            &foreign.id,
            &input("Quiz", 5.0, 10.0),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::PeriodNotFound { .. }));
        assert!(matches!(
            record_grade(&conn, &fx.enrollment_id, &fx.subject_id, "missing", &input("Quiz", 5.0, 10.0)),
            Err(EngineError::PeriodNotFound { .. })
        ));
    }

    #[test]
    fn shrinking_update_at_capacity_never_hits_budget() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);

        let a = record_grade(&conn, e, s, p, &input("A", 40.0, 50.0)).expect("a");
        record_grade(&conn, e, s, p, &input("B", 40.0, 50.0)).expect("b");
        // Lowered budget leaves the subject over capacity.
        curriculum::set_budget(&conn, &fx.year_id, &fx.class_id, s, 60.0).expect("resize");

        let shrunk = update_grade(&conn, &a.id, &input("A renamed", 20.0, 30.0)).expect("shrink");
        assert_eq!(shrunk.max_score, 30.0);
        assert_eq!(shrunk.name, "A renamed");

        let err = update_grade(&conn, &a.id, &input("A renamed", 20.0, 31.0)).unwrap_err();
        assert!(matches!(err, EngineError::BudgetExceeded { .. }));
    }

    #[test]
    fn update_duplicate_check_skips_self() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);

        let a = record_grade(&conn, e, s, p, &input("Lab", 5.0, 10.0)).expect("lab");
        record_grade(&conn, e, s, p, &input("Test", 5.0, 10.0)).expect("test");
        update_grade(&conn, &a.id, &input("LAB", 6.0, 10.0)).expect("same name, new case");
        assert!(matches!(
            update_grade(&conn, &a.id, &input("test", 6.0, 10.0)),
            Err(EngineError::DuplicateEvaluation { .. })
        ));
    }

    #[test]
    fn subject_average_scales_to_budget() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);

        let empty = subject_average(&conn, e, s, p).expect("empty");
        assert_eq!(empty.average, 0.0);

        record_grade(&conn, e, s, p, &input("T1", 18.0, 20.0)).expect("t1");
        record_grade(&conn, e, s, p, &input("T2", 9.0, 10.0)).expect("t2");
        let avg = subject_average(&conn, e, s, p).expect("avg");
        assert!((avg.average - 90.0).abs() < 1e-9);
        assert_eq!(avg.grade_count, 2);
    }

    #[test]
    fn concurrent_writers_cannot_overshoot_budget() {
        let fx = Fixture::new();
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let conn = fx.conn();
                let (e, s, p) = (
                    fx.enrollment_id.clone(),
                    fx.subject_id.clone(),
                    fx.period_id.clone(),
                );
                thread::spawn(move || {
                    let mut accepted = 0;
                    for i in 0..10 {
                        let name = format!("w{}-{}", w, i);
                        if record_grade(&conn, &e, &s, &p, &input(&name, 1.0, 7.0)).is_ok() {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = writers.into_iter().map(|h| h.join().expect("join")).sum();

        let conn = fx.conn();
        let sum = graded_max_sum(&conn, &fx.enrollment_id, &fx.subject_id, &fx.period_id, None)
            .expect("sum");
        assert_eq!(accepted, 14);
        assert!(sum <= 100.0 + calc::BUDGET_EPSILON);
    }

    #[test]
    fn concurrent_growing_updates_cannot_overshoot_budget() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, s, p) = (&fx.enrollment_id, &fx.subject_id, &fx.period_id);
        // Eight grades of 5 points leave 60 points of headroom.
        let ids: Vec<String> = (0..8)
            .map(|i| {
                record_grade(&conn, e, s, p, &input(&format!("g{}", i), 1.0, 5.0))
                    .expect("seed")
                    .id
            })
            .collect();

        let writers: Vec<_> = ids
            .chunks(2)
            .map(|owned| {
                let conn = fx.conn();
                let owned = owned.to_vec();
                thread::spawn(move || {
                    let mut accepted = 0;
                    for round in 1..=3 {
                        for (i, id) in owned.iter().enumerate() {
                            let max_score = 5.0 + 5.0 * round as f64;
                            let name = format!("{}-{}", id, i);
                            if update_grade(&conn, id, &input(&name, 1.0, max_score)).is_ok() {
                                accepted += 1;
                            }
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = writers.into_iter().map(|h| h.join().expect("join")).sum();

        let sum = graded_max_sum(&conn, e, s, p, None).expect("sum");
        assert!(accepted > 0);
        assert!(sum <= 100.0 + calc::BUDGET_EPSILON, "sum {} over budget", sum);
        let listed: f64 = ids
            .iter()
            .map(|id| get_grade(&conn, id).expect("grade").max_score)
            .sum();
        assert!((listed - sum).abs() < 1e-9);
    }
}
