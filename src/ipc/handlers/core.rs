use crate::db;
use crate::engine::settings;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_required_f64, with_workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(workspace = %path.display(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => {
            error!(workspace = %path.display(), error = ?e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn settings_json(conn: &rusqlite::Connection) -> Result<serde_json::Value, HandlerErr> {
    let configured = settings::configured_threshold(conn)?;
    let effective = settings::passing_threshold(conn)?;
    Ok(json!({
        "passingThreshold": effective,
        "passingThresholdConfigured": configured.is_some(),
    }))
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_workspace(state, req, |conn, _| settings_json(conn))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_workspace(state, req, |conn, params| {
        let threshold = get_required_f64(params, "passingThreshold")?;
        settings::set_passing_threshold(conn, threshold)?;
        info!(threshold, "passing threshold updated");
        settings_json(conn)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
