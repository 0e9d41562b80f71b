//! Report-card aggregation. Two formulas coexist on purpose: period averages
//! are budget-weighted across subjects, annual averages are an unweighted mean
//! of per-subject percentages over the whole year. Promotion uses the latter.
//!
//! Absent data never fails a read: ungraded subjects average to zero and an
//! ungraded period has no average at all.

use super::directory::{self, AcademicPeriod};
use super::error::EngineResult;
use super::{appreciations, curriculum, grades, settings};
use crate::calc::{self, ScoreTotals, SubjectPeriodResult};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReportLine {
    pub subject_id: String,
    pub subject_name: String,
    pub budget: f64,
    pub average: f64,
    pub graded_max: f64,
    pub grade_count: usize,
    pub appreciation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualOutcome {
    pub average: f64,
    pub threshold: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub enrollment_id: String,
    pub period: AcademicPeriod,
    pub subjects: Vec<SubjectReportLine>,
    pub period_average: Option<f64>,
    pub general_appreciation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual: Option<AnnualOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub grades_visible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PeriodReport>,
}

pub fn period_report(conn: &Connection, enrollment_id: &str, period_id: &str) -> EngineResult<PeriodReport> {
    let ctx = directory::resolve_enrollment(conn, enrollment_id)?;
    let period = directory::resolve_period(conn, period_id, &ctx.school_year_id)?;
    let entries = curriculum::list(conn, &ctx.school_year_id, &ctx.class_id)?;
    let totals: HashMap<String, ScoreTotals> = grades::totals_by_subject(conn, enrollment_id, Some(period_id))?
        .into_iter()
        .collect();
    let mut notes = appreciations::subject_appreciations(conn, enrollment_id, period_id)?;

    let subjects: Vec<SubjectReportLine> = entries
        .into_iter()
        .map(|entry| {
            let t = totals.get(&entry.subject_id).copied().unwrap_or_default();
            SubjectReportLine {
                average: calc::subject_average(&t, entry.budget),
                graded_max: t.max_sum,
                grade_count: t.count,
                appreciation: notes.remove(&entry.subject_id),
                budget: entry.budget,
                subject_name: entry.subject_name,
                subject_id: entry.subject_id,
            }
        })
        .collect();

    let period_average = calc::period_average(subjects.iter().map(|s| SubjectPeriodResult {
        average: s.average,
        budget: s.budget,
        graded_max: s.graded_max,
    }));

    let annual = if period.is_final {
        Some(annual_outcome(conn, enrollment_id)?)
    } else {
        None
    };

    Ok(PeriodReport {
        enrollment_id: enrollment_id.to_string(),
        general_appreciation: appreciations::general_appreciation(conn, enrollment_id, period_id)?,
        period,
        subjects,
        period_average,
        annual,
    })
}

pub fn annual_average(conn: &Connection, enrollment_id: &str) -> EngineResult<f64> {
    directory::resolve_enrollment(conn, enrollment_id)?;
    let per_subject = grades::totals_by_subject(conn, enrollment_id, None)?;
    Ok(calc::annual_average(per_subject.into_iter().map(|(_, t)| t)))
}

pub fn annual_outcome(conn: &Connection, enrollment_id: &str) -> EngineResult<AnnualOutcome> {
    let average = annual_average(conn, enrollment_id)?;
    let threshold = settings::passing_threshold(conn)?;
    Ok(AnnualOutcome {
        average,
        threshold,
        passed: calc::passes(average, threshold),
    })
}

/// Self-service read: the report is withheld while the grade gate is closed.
pub fn student_view(conn: &Connection, enrollment_id: &str, period_id: &str) -> EngineResult<StudentView> {
    let ctx = directory::resolve_enrollment(conn, enrollment_id)?;
    if !ctx.grades_visible {
        return Ok(StudentView {
            grades_visible: false,
            report: None,
        });
    }
    Ok(StudentView {
        grades_visible: true,
        report: Some(period_report(conn, enrollment_id, period_id)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::grades::{record_grade, GradeInput};
    use crate::engine::testing::Fixture;

    fn grade(name: &str, score: f64, max_score: f64) -> GradeInput {
        GradeInput {
            name: name.to_string(),
            score,
            max_score,
            graded_on: None,
        }
    }

    #[test]
    fn ungraded_period_has_no_average_but_lists_subjects() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let report = period_report(&conn, &fx.enrollment_id, &fx.period_id).expect("report");
        assert_eq!(report.period_average, None);
        assert_eq!(report.subjects.len(), 2);
        assert!(report.subjects.iter().all(|s| s.average == 0.0));
    }

    #[test]
    fn period_average_is_budget_weighted() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let (e, p) = (&fx.enrollment_id, &fx.period_id);
        // Main subject, budget 100: 90%.
        record_grade(&conn, e, &fx.subject_id, p, &grade("T1", 27.0, 30.0)).expect("t1");
        // Second subject, budget 50: 10%.
        record_grade(&conn, e, &fx.second_subject_id, p, &grade("T1", 2.0, 20.0)).expect("t1b");

        let report = period_report(&conn, e, p).expect("report");
        let avg = report.period_average.expect("average");
        assert!((avg - (90.0 + 5.0) / 150.0 * 100.0).abs() < 1e-9);
        // Single-period year: the only period is final, annual block present.
        let annual = report.annual.expect("annual");
        assert!((annual.average - 50.0).abs() < 1e-9);
        assert!(!annual.passed);
    }

    #[test]
    fn annual_average_ignores_budgets_and_periods() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let e = &fx.enrollment_id;
        let p2 = fx.add_period("Term 2");
        record_grade(&conn, e, &fx.subject_id, &fx.period_id, &grade("A", 5.0, 20.0)).expect("a");
        record_grade(&conn, e, &fx.subject_id, &p2, &grade("B", 15.0, 20.0)).expect("b");
        record_grade(&conn, e, &fx.second_subject_id, &p2, &grade("C", 8.0, 10.0)).expect("c");

        let avg = annual_average(&conn, e).expect("annual");
        assert!((avg - 65.0).abs() < 1e-9);
        let outcome = annual_outcome(&conn, e).expect("outcome");
        assert!(outcome.passed);
        assert_eq!(outcome.threshold, 60.0);
    }

    #[test]
    fn student_view_respects_gate() {
        let fx = Fixture::new();
        let conn = fx.conn();
        let hidden = student_view(&conn, &fx.enrollment_id, &fx.period_id).expect("hidden");
        assert!(!hidden.grades_visible);
        assert!(hidden.report.is_none());

        directory::set_grades_visible(&conn, &fx.enrollment_id, true).expect("open gate");
        let shown = student_view(&conn, &fx.enrollment_id, &fx.period_id).expect("shown");
        assert!(shown.report.is_some());
    }
}
