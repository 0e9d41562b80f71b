use super::error::{err, ok, HandlerErr};
use super::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// Runs a handler body against the selected workspace and wraps the outcome
/// in the response envelope.
pub fn with_workspace<F>(state: &mut AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    Ok(serde_json::to_value(value)?)
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    get_optional_f64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn get_optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_required_bool(params: &Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Money arrives as a decimal string ("1250.00") or a JSON number.
pub fn get_optional_decimal(params: &Value, key: &str) -> Result<Option<Decimal>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value::<Decimal>(v.clone())
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be a decimal amount", key))),
    }
}

pub fn get_required_decimal(params: &Value, key: &str) -> Result<Decimal, HandlerErr> {
    get_optional_decimal(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}
