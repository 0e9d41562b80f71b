use crate::engine::{curriculum, directory};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_f64, get_optional_str, get_required_f64, get_required_str, to_json,
    with_workspace,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Accepts either `classId` or `className`.
fn resolve_class(conn: &Connection, params: &Value) -> Result<String, HandlerErr> {
    if let Some(id) = get_optional_str(params, "classId")? {
        return Ok(id);
    }
    match get_optional_str(params, "className")? {
        Some(name) => Ok(directory::class_id_by_name(conn, &name)?),
        None => Err(HandlerErr::bad_params("missing classId or className")),
    }
}

fn curriculum_assign(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = resolve_class(conn, params)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let budget = get_optional_f64(params, "budget")?;
    to_json(&curriculum::assign(conn, &year_id, &class_id, &subject_id, budget)?)
}

fn curriculum_unassign(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = resolve_class(conn, params)?;
    let subject_id = get_required_str(params, "subjectId")?;
    curriculum::unassign(conn, &year_id, &class_id, &subject_id)?;
    Ok(json!({ "ok": true }))
}

fn curriculum_set_budget(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = resolve_class(conn, params)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let budget = get_required_f64(params, "budget")?;
    to_json(&curriculum::set_budget(
        conn,
        &year_id,
        &class_id,
        &subject_id,
        budget,
    )?)
}

fn curriculum_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = resolve_class(conn, params)?;
    Ok(json!({ "entries": curriculum::list(conn, &year_id, &class_id)? }))
}

fn curriculum_budget_for(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = resolve_class(conn, params)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let budget = curriculum::budget_for(conn, &year_id, &class_id, &subject_id)?;
    Ok(json!({ "budget": budget }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "curriculum.assign" => curriculum_assign,
        "curriculum.unassign" => curriculum_unassign,
        "curriculum.setBudget" => curriculum_set_budget,
        "curriculum.list" => curriculum_list,
        "curriculum.budgetFor" => curriculum_budget_for,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
