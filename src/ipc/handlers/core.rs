use crate::db::open_db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_ping(req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn handle_workspace_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = PathBuf::from(path);
    match open_db(&workspace) {
        Ok(conn) => {
            state.db = Some(conn);
            state.workspace = Some(workspace.clone());
            ok(&req.id, json!({ "workspace": workspace.to_string_lossy() }))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to open workspace");
            err(&req.id, "workspace_open_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "app.ping" => Some(handle_ping(req)),
        "workspace.open" => Some(handle_workspace_open(state, req)),
        _ => None,
    }
}
