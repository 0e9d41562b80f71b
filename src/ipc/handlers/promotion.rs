use crate::engine::promotion::{self, PromotionMap};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, to_json, with_workspace};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;

/// `map` is an object of class name -> next class name (or null when the
/// class is terminal).
fn parse_map(params: &Value) -> Result<PromotionMap, HandlerErr> {
    let Some(raw) = params.get("map") else {
        return Err(HandlerErr::bad_params("missing map"));
    };
    serde_json::from_value::<PromotionMap>(raw.clone()).map_err(|_| {
        HandlerErr::bad_params("map must be an object of class name to class name or null")
    })
}

fn promotion_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let map = parse_map(params)?;
    to_json(&promotion::preview(conn, &year_id, &map)?)
}

fn promotion_execute(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_required_str(params, "schoolYearId")?;
    let map = parse_map(params)?;
    to_json(&promotion::execute(conn, &year_id, &map)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let body: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "promotion.preview" => promotion_preview,
        "promotion.execute" => promotion_execute,
        _ => return None,
    };
    Some(with_workspace(state, req, body))
}
