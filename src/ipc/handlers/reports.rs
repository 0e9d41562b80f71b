use crate::engine::averaging;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, to_json, with_workspace};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;

fn reports_period(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let period_id = get_required_str(params, "periodId")?;
    to_json(&averaging::period_report(conn, &enrollment_id, &period_id)?)
}

fn reports_annual_average(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    to_json(&averaging::annual_outcome(conn, &enrollment_id)?)
}

fn reports_student_view(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let period_id = get_required_str(params, "periodId")?;
    to_json(&averaging::student_view(conn, &enrollment_id, &period_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "reports.period" => reports_period,
        "reports.annualAverage" => reports_annual_average,
        "reports.studentView" => reports_student_view,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
