use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, require_db, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    log::info!("workspace opened: {}", path.display());
    Ok(())
}

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

    match open_workspace(state, &path) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            log::error!("workspace open failed for {}: {:#}", path.display(), e);
            err(&req.id, "db_open_failed", format!("{e:#}"), None)
        }
    }
}

fn settings_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let key = get_required_str(&req.params, "key")?;
    let value = db::settings_get_json(conn, &key)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(json!({ "key": key, "value": value }))
}

fn settings_set(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let key = get_required_str(&req.params, "key")?;
    let Some(value) = req.params.get("value") else {
        return Err(HandlerErr::new("bad_params", "missing value"));
    };
    db::settings_set_json(conn, &key, value)
        .map_err(|e| HandlerErr::new("db_insert_failed", format!("{e:#}")))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(respond(&req.id, settings_get(state, req))),
        "settings.set" => Some(respond(&req.id, settings_set(state, req))),
        _ => None,
    }
}
