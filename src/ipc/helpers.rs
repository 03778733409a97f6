use crate::confirm::ConfirmGate;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::query::DEFAULT_PAGE_SIZE;
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::json;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_bool(req: &Request, key: &str) -> Result<bool, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "open a workspace first", None))
}

/// `page` defaults to 1, `pageSize` to the standard screen size.
pub fn page_params(req: &Request) -> (i64, i64) {
    let page = req
        .params
        .get("page")
        .and_then(|v| v.as_i64())
        .unwrap_or(1);
    let page_size = req
        .params
        .get("pageSize")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_PAGE_SIZE);
    (page, page_size)
}

/// Destructive actions commit only against the exact typed literal. The
/// request replays the idle -> confirming -> committing gate, so the daemon
/// enforces the same flow the dashboard drives.
pub fn require_confirm(req: &Request, literal: &'static str) -> Result<(), serde_json::Value> {
    let typed = optional_str(req, "confirm").unwrap_or_default();
    let mut gate = ConfirmGate::destructive(literal);
    gate.begin();
    gate.input(&typed);
    if gate.commit() {
        gate.finish();
        Ok(())
    } else {
        Err(err(
            &req.id,
            "confirmation_required",
            format!("type \"{}\" to confirm", literal),
            Some(json!({ "required": literal })),
        ))
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
