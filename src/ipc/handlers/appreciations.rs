use crate::engine::appreciations;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_str, with_workspace};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn appreciations_set(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let period_id = get_required_str(params, "periodId")?;
    let text = get_optional_str(params, "text")?.unwrap_or_default();
    appreciations::set_subject_appreciation(conn, &enrollment_id, &subject_id, &period_id, &text)?;
    Ok(json!({ "ok": true }))
}

fn appreciations_set_general(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let period_id = get_required_str(params, "periodId")?;
    let text = get_optional_str(params, "text")?.unwrap_or_default();
    appreciations::set_general_appreciation(conn, &enrollment_id, &period_id, &text)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "appreciations.set" => appreciations_set,
        "appreciations.setGeneral" => appreciations_set_general,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
