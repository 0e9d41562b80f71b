use crate::engine::finance::{self, Adjustment, Payment};
use crate::engine::settings;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_i64, get_required_decimal, get_required_str, to_json, with_workspace,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

fn parse_list<T: DeserializeOwned>(params: &Value, key: &str) -> Result<Vec<T>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(raw) => serde_json::from_value::<Vec<T>>(raw.clone())
            .map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e))),
    }
}

fn finance_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    to_json(&finance::statement(conn, &enrollment_id)?)
}

fn finance_set_ledger(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let payments: Vec<Payment> = parse_list(params, "payments")?;
    let adjustments: Vec<Adjustment> = parse_list(params, "adjustments")?;
    let expected_version = get_optional_i64(params, "expectedVersion")?;
    to_json(&finance::set_payments_and_adjustments(
        conn,
        &enrollment_id,
        &payments,
        &adjustments,
        expected_version,
    )?)
}

fn finance_set_base_tuition(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let amount = get_required_decimal(params, "amount")?;
    let expected_version = get_optional_i64(params, "expectedVersion")?;
    to_json(&finance::set_base_tuition(
        conn,
        &enrollment_id,
        amount,
        expected_version,
    )?)
}

fn finance_class_statement(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = get_required_str(params, "classId")?;
    to_json(&finance::class_statement(conn, &year_id, &class_id)?)
}

fn tuition_set_class_default(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let class_id = get_required_str(params, "classId")?;
    let amount = get_required_decimal(params, "amount")?;
    settings::set_class_default_tuition(conn, &class_id, &year_id, amount)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "finance.get" => finance_get,
        "finance.setLedger" => finance_set_ledger,
        "finance.setBaseTuition" => finance_set_base_tuition,
        "finance.classStatement" => finance_class_statement,
        "tuition.setClassDefault" => tuition_set_class_default,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
