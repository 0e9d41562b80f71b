use crate::engine::grades::{self, GradeInput};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_required_f64, get_required_str, to_json,
    with_workspace,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn parse_grade_input(params: &Value) -> Result<GradeInput, HandlerErr> {
    Ok(GradeInput {
        name: get_required_str(params, "name")?,
        score: get_required_f64(params, "score")?,
        max_score: get_required_f64(params, "maxScore")?,
        graded_on: get_optional_date(params, "date")?,
    })
}

fn grades_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let period_id = get_required_str(params, "periodId")?;
    let input = parse_grade_input(params)?;
    to_json(&grades::record_grade(
        conn,
        &enrollment_id,
        &subject_id,
        &period_id,
        &input,
    )?)
}

fn grades_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let grade_id = get_required_str(params, "gradeId")?;
    let input = parse_grade_input(params)?;
    to_json(&grades::update_grade(conn, &grade_id, &input)?)
}

fn grades_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let grade_id = get_required_str(params, "gradeId")?;
    grades::delete_grade(conn, &grade_id)?;
    Ok(json!({ "ok": true }))
}

fn grades_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let period_id = get_optional_str(params, "periodId")?;
    let subject_id = get_optional_str(params, "subjectId")?;
    let rows = grades::list_grades(
        conn,
        &enrollment_id,
        period_id.as_deref(),
        subject_id.as_deref(),
    )?;
    Ok(json!({ "grades": rows }))
}

fn grades_subject_average(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let period_id = get_required_str(params, "periodId")?;
    to_json(&grades::subject_average(
        conn,
        &enrollment_id,
        &subject_id,
        &period_id,
    )?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "grades.record" => grades_record,
        "grades.update" => grades_update,
        "grades.delete" => grades_delete,
        "grades.list" => grades_list,
        "grades.subjectAverage" => grades_subject_average,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
