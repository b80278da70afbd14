use crate::db;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup::load_grid_layout;
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule::Schedule;
use crate::session::SessionStore;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "session": state.session.phase(),
        }),
    )
}

/// Opens the workspace database, then restores the session and rebuilds the
/// grid from the stored layout. The previous workspace stays selected if any
/// step fails.
pub fn select_workspace(state: &mut AppState, path: &Path) -> Result<serde_json::Value, HandlerErr> {
    let conn = db::open_db(path).map_err(|e| {
        log::error!("failed to open workspace {}: {e:?}", path.display());
        HandlerErr::new("db_open_failed", format!("{e}"))
    })?;

    let mut session = SessionStore::new();
    let phase = session.init(&conn).map_err(HandlerErr::from)?;
    let layout = load_grid_layout(&conn).map_err(|e| {
        log::error!("failed to read schedule layout: {e:?}");
        HandlerErr::new("storage_error", "workspace settings are unavailable")
    })?;

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.session = session;
    state.schedule = Schedule::new(layout);
    state.editor = None;
    log::info!("workspace selected: {}", path.display());

    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "session": phase,
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = required_str(&req.params, "path")
        .map(PathBuf::from)
        .and_then(|path| select_workspace(state, &path));
    match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
