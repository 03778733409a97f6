use crate::enrich::{self, or_empty};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_rfc3339, optional_str, page_params, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{decode_messages, ReportMessage, SenderType};
use crate::query::{sort_clause, ListQuery};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const REPORT_SORTS: &[(&str, &str)] = &[
    ("newest", "created_at DESC"),
    ("oldest", "created_at ASC"),
    ("status", "status ASC, created_at DESC"),
];

const REPORT_STATUSES: &[&str] = &["pending", "in_progress", "resolved"];

struct ReportListRow {
    id: String,
    title: String,
    description: Option<String>,
    report_type: Option<String>,
    content_type: Option<String>,
    reporter_id: Option<String>,
    reported_user_id: Option<String>,
    status: String,
    message_count: usize,
    created_at: String,
}

fn user_ref_json(
    user_id: Option<&str>,
    profiles: &HashMap<String, enrich::ProfileSummary>,
) -> serde_json::Value {
    let Some(user_id) = user_id else {
        return serde_json::Value::Null;
    };
    let username = profiles
        .get(user_id)
        .map(|p| p.username.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    json!({ "id": user_id, "username": username })
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (page, page_size) = page_params(req);
    let search = optional_str(req, "search");
    let status = optional_str(req, "status");
    let report_type = optional_str(req, "reportType");
    let sort = optional_str(req, "sort");

    let result = ListQuery::new("reports")
        .search(&["title", "description"], search.as_deref())
        .filter_eq("status", status.as_deref())
        .filter_eq("report_type", report_type.as_deref())
        .order_by(sort_clause(sort.as_deref(), REPORT_SORTS, "created_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, |row| {
            let id: String = row.get("id")?;
            let messages_raw: String = row.get("messages")?;
            let message_count = match decode_messages(&messages_raw) {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::warn!(report = %id, error = %e, "skipping report with malformed messages");
                    return Ok(None);
                }
            };
            Ok(Some(ReportListRow {
                id,
                title: row.get("title")?,
                description: row.get("description")?,
                report_type: row.get("report_type")?,
                content_type: row.get("content_type")?,
                reporter_id: row.get("reporter_id")?,
                reported_user_id: row.get("reported_user_id")?,
                status: row.get("status")?,
                message_count,
                created_at: row.get("created_at")?,
            }))
        });

    let mut user_ids: HashSet<String> = HashSet::new();
    for r in &result.data {
        user_ids.extend(r.reporter_id.iter().cloned());
        user_ids.extend(r.reported_user_id.iter().cloned());
    }
    let profiles = or_empty(enrich::profile_summaries(conn, &user_ids));

    let data: Vec<serde_json::Value> = result
        .data
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "description": r.description,
                "reportType": r.report_type,
                "contentType": r.content_type,
                "status": r.status,
                "messageCount": r.message_count,
                "createdAt": r.created_at,
                "reporter": user_ref_json(r.reporter_id.as_deref(), &profiles),
                "reportedUser": user_ref_json(r.reported_user_id.as_deref(), &profiles),
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "data": data,
            "totalCount": result.total_count,
            "totalPages": result.total_pages,
            "currentPage": result.current_page,
            "filters": {
                "search": search,
                "status": status,
                "reportType": report_type,
                "sort": sort,
            },
        }),
    )
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    type ReportRow = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
        Option<String>,
        String,
        String,
        i64,
    );
    let row: Option<ReportRow> = match conn
        .query_row(
            "SELECT title, description, report_type, content_type, reporter_id,
                    reported_user_id, status, admin_notes, messages, created_at, version
             FROM reports WHERE id = ?",
            [&report_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                    r.get(8)?,
                    r.get(9)?,
                    r.get(10)?,
                ))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((
        title,
        description,
        report_type,
        content_type,
        reporter_id,
        reported_user_id,
        status,
        admin_notes,
        messages_raw,
        created_at,
        version,
    )) = row
    else {
        return err(&req.id, "not_found", "report not found", None);
    };

    let messages = match decode_messages(&messages_raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(report = %report_id, error = %e, "malformed messages column");
            return err(&req.id, "bad_row", "report has a malformed messages column", None);
        }
    };

    let mut user_ids: HashSet<String> = HashSet::new();
    user_ids.extend(reporter_id.iter().cloned());
    user_ids.extend(reported_user_id.iter().cloned());
    let profiles = or_empty(enrich::profile_summaries(conn, &user_ids));

    ok(
        &req.id,
        json!({
            "id": report_id,
            "title": title,
            "description": description,
            "reportType": report_type,
            "contentType": content_type,
            "status": status,
            "adminNotes": admin_notes,
            "messages": messages,
            "createdAt": created_at,
            "version": version,
            "reporter": user_ref_json(reporter_id.as_deref(), &profiles),
            "reportedUser": user_ref_json(reported_user_id.as_deref(), &profiles),
        }),
    )
}

fn handle_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match required_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !REPORT_STATUSES.contains(&status.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: pending, in_progress, resolved",
            Some(json!({ "status": status })),
        );
    }

    match conn.execute(
        "UPDATE reports SET status = ? WHERE id = ?",
        (&status, &report_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "report not found", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "status": status })),
        Err(e) => {
            tracing::error!(report = %report_id, error = %e, "status update failed");
            err(&req.id, "db_mutation_failed", "could not update report", None)
        }
    }
}

fn handle_update_admin_notes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let notes = match required_str(req, "notes") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute(
        "UPDATE reports SET admin_notes = ? WHERE id = ?",
        (&notes, &report_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "report not found", None),
        Ok(_) => ok(&req.id, json!({ "updated": true })),
        Err(e) => {
            tracing::error!(report = %report_id, error = %e, "admin notes update failed");
            err(&req.id, "db_mutation_failed", "could not update report", None)
        }
    }
}

/// Reads the message thread plus its version for a compare-and-swap edit.
fn load_messages(
    conn: &Connection,
    req: &Request,
    report_id: &str,
) -> Result<(Vec<ReportMessage>, i64), serde_json::Value> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT messages, version FROM reports WHERE id = ?",
            [report_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let Some((messages_raw, version)) = row else {
        return Err(err(&req.id, "not_found", "report not found", None));
    };
    let messages = decode_messages(&messages_raw).map_err(|e| {
        tracing::error!(report = %report_id, error = %e, "malformed messages column");
        err(&req.id, "bad_row", "report has a malformed messages column", None)
    })?;
    Ok((messages, version))
}

fn store_messages(
    conn: &Connection,
    req: &Request,
    report_id: &str,
    messages: &[ReportMessage],
    expected_version: i64,
) -> Result<i64, serde_json::Value> {
    let encoded = serde_json::to_string(messages)
        .map_err(|e| err(&req.id, "db_mutation_failed", e.to_string(), None))?;
    let affected = conn
        .execute(
            "UPDATE reports SET messages = ?, version = version + 1
             WHERE id = ? AND version = ?",
            (&encoded, report_id, expected_version),
        )
        .map_err(|e| {
            tracing::error!(report = %report_id, error = %e, "message thread update failed");
            err(&req.id, "db_mutation_failed", "could not update messages", None)
        })?;
    if affected == 0 {
        return Err(err(
            &req.id,
            "conflict",
            "report was modified concurrently, reload and retry",
            None,
        ));
    }
    Ok(expected_version + 1)
}

fn handle_add_message(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let content = match required_str(req, "content") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if content.trim().is_empty() {
        return err(&req.id, "bad_params", "message content must not be empty", None);
    }

    let (mut messages, version) = match load_messages(conn, req, &report_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let message = ReportMessage {
        id: Uuid::new_v4().to_string(),
        sender_type: SenderType::Admin,
        content,
        created_at: now_rfc3339(),
    };
    messages.push(message.clone());

    match store_messages(conn, req, &report_id, &messages, version) {
        Ok(new_version) => ok(
            &req.id,
            json!({ "message": message, "version": new_version }),
        ),
        Err(e) => e,
    }
}

fn handle_remove_message(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let message_id = match required_str(req, "messageId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let (mut messages, version) = match load_messages(conn, req, &report_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before = messages.len();
    messages.retain(|m| m.id != message_id);
    if messages.len() == before {
        return err(&req.id, "not_found", "message not found in report", None);
    }

    match store_messages(conn, req, &report_id, &messages, version) {
        Ok(new_version) => ok(
            &req.id,
            json!({
                "updated": true,
                "removedMessageId": message_id,
                "messageCount": messages.len(),
                "version": new_version,
            }),
        ),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.list" => Some(handle_list(state, req)),
        "reports.get" => Some(handle_get(state, req)),
        "reports.setStatus" => Some(handle_set_status(state, req)),
        "reports.updateAdminNotes" => Some(handle_update_admin_notes(state, req)),
        "reports.addMessage" => Some(handle_add_message(state, req)),
        "reports.removeMessage" => Some(handle_remove_message(state, req)),
        _ => None,
    }
}
