//! End-of-year promotion. A preview and an execution over the same inputs
//! make the same decisions; execution then moves the class reference of every
//! admitted student whose class has a successor.

use super::directory;
use super::error::EngineResult;
use super::{averaging, settings};
use crate::calc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Source class name -> next class name, `None` for a terminal class.
pub type PromotionMap = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTally {
    pub admitted: usize,
    pub failed: usize,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDecision {
    pub enrollment_id: String,
    pub student_id: String,
    pub class_name: String,
    pub annual_average: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPreview {
    pub threshold: f64,
    pub summary: BTreeMap<String, ClassTally>,
    pub students: Vec<StudentDecision>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    pub threshold: f64,
    pub summary: BTreeMap<String, ClassTally>,
    pub promoted_student_ids: Vec<String>,
}

fn evaluate(conn: &Connection, school_year_id: &str, map: &PromotionMap) -> EngineResult<PromotionPreview> {
    let threshold = settings::passing_threshold(conn)?;
    let enrollments = directory::list_enrollments(conn, school_year_id, None)?;
    let mut summary: BTreeMap<String, ClassTally> = BTreeMap::new();
    let mut students = Vec::with_capacity(enrollments.len());

    for enrollment in enrollments {
        let annual_average = averaging::annual_average(conn, &enrollment.id)?;
        let passed = calc::passes(annual_average, threshold);
        let tally = summary
            .entry(enrollment.class_name.clone())
            .or_insert_with(|| ClassTally {
                target: map.get(&enrollment.class_name).cloned().flatten(),
                ..ClassTally::default()
            });
        if passed {
            tally.admitted += 1;
        } else {
            tally.failed += 1;
        }
        students.push(StudentDecision {
            enrollment_id: enrollment.id,
            student_id: enrollment.student_id,
            class_name: enrollment.class_name,
            annual_average,
            passed,
        });
    }

    Ok(PromotionPreview {
        threshold,
        summary,
        students,
    })
}

pub fn preview(conn: &Connection, school_year_id: &str, map: &PromotionMap) -> EngineResult<PromotionPreview> {
    evaluate(conn, school_year_id, map)
}

/// Runs the promotion in one transaction. Unknown target classes fail the
/// whole run before anything is written. Repeating a run after grades or the
/// map changed can move students again.
pub fn execute(conn: &Connection, school_year_id: &str, map: &PromotionMap) -> EngineResult<PromotionOutcome> {
    directory::require_year(conn, school_year_id)?;
    let mut target_ids: HashMap<&str, String> = HashMap::new();
    for target in map.values().flatten() {
        let id = directory::class_id_by_name(conn, target)?;
        target_ids.insert(target.as_str(), id);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let decisions = evaluate(&tx, school_year_id, map)?;
    let mut promoted_student_ids = Vec::new();
    for student in decisions.students.iter().filter(|s| s.passed) {
        let Some(Some(target)) = map.get(&student.class_name) else {
            continue;
        };
        let Some(target_id) = target_ids.get(target.as_str()) else {
            continue;
        };
        directory::set_student_class(&tx, &student.student_id, target_id)?;
        promoted_student_ids.push(student.student_id.clone());
    }
    tx.commit()?;

    info!(
        school_year_id,
        promoted = promoted_student_ids.len(),
        evaluated = decisions.students.len(),
        "promotion executed"
    );
    Ok(PromotionOutcome {
        threshold: decisions.threshold,
        summary: decisions.summary,
        promoted_student_ids,
    })
}
