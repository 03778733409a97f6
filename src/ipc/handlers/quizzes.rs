use crate::assets::avatar_url;
use crate::confirm::{CONFIRM_BLOCK, CONFIRM_MOVE_TO_TRASH};
use crate::enrich::{self, or_empty};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, now_rfc3339, optional_str, page_params, require_confirm, required_bool, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::decode_questions;
use crate::query::{sort_clause, ListQuery};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashSet;

const QUIZ_SORTS: &[(&str, &str)] = &[
    ("newest", "created_at DESC"),
    ("oldest", "created_at ASC"),
    ("title", "LOWER(title) ASC"),
    ("questions_desc", "json_array_length(questions) DESC"),
    ("questions_asc", "json_array_length(questions) ASC"),
];

struct QuizListRow {
    id: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    language: Option<String>,
    question_count: usize,
    visible: bool,
    blocked: bool,
    creator_id: Option<String>,
    created_at: String,
}

fn creator_json(
    creator_id: Option<&str>,
    profiles: &std::collections::HashMap<String, enrich::ProfileSummary>,
) -> serde_json::Value {
    let Some(creator_id) = creator_id else {
        return serde_json::Value::Null;
    };
    match profiles.get(creator_id) {
        Some(p) => json!({
            "id": creator_id,
            "username": p.username,
            "fullname": p.fullname,
            "avatarUrl": avatar_url(p.avatar_path.as_deref(), &p.username),
        }),
        None => json!({
            "id": creator_id,
            "username": "Unknown",
            "fullname": serde_json::Value::Null,
            "avatarUrl": avatar_url(None, creator_id),
        }),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (page, page_size) = page_params(req);
    let search = optional_str(req, "search");
    let category = optional_str(req, "category");
    let language = optional_str(req, "language");
    let status = optional_str(req, "status");
    let visibility = optional_str(req, "visibility");
    let sort = optional_str(req, "sort");

    let blocked_filter = match status.as_deref() {
        Some("active") => Some(false),
        Some("blocked") => Some(true),
        _ => None,
    };
    let visible_filter = match visibility.as_deref() {
        Some("visible") => Some(true),
        Some("hidden") => Some(false),
        _ => None,
    };

    let result = ListQuery::new("quizzes")
        .in_trash(false)
        .search(&["title", "description"], search.as_deref())
        .filter_eq("category", category.as_deref())
        .filter_eq("language", language.as_deref())
        .filter_flag("blocked", blocked_filter)
        .filter_flag("visible", visible_filter)
        .order_by(sort_clause(sort.as_deref(), QUIZ_SORTS, "created_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, |row| {
            let id: String = row.get("id")?;
            let questions_raw: String = row.get("questions")?;
            let question_count = match decode_questions(&questions_raw) {
                Ok(qs) => qs.len(),
                Err(e) => {
                    tracing::warn!(quiz = %id, error = %e, "skipping quiz with malformed questions");
                    return Ok(None);
                }
            };
            Ok(Some(QuizListRow {
                id,
                title: row.get("title")?,
                description: row.get("description")?,
                category: row.get("category")?,
                language: row.get("language")?,
                question_count,
                visible: row.get::<_, i64>("visible")? != 0,
                blocked: row.get::<_, i64>("blocked")? != 0,
                creator_id: row.get("creator_id")?,
                created_at: row.get("created_at")?,
            }))
        });

    let creator_ids: HashSet<String> = result
        .data
        .iter()
        .filter_map(|r| r.creator_id.clone())
        .collect();
    let profiles = or_empty(enrich::profile_summaries(conn, &creator_ids));

    let data: Vec<serde_json::Value> = result
        .data
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "description": r.description,
                "category": r.category,
                "language": r.language,
                "questionCount": r.question_count,
                "visible": r.visible,
                "blocked": r.blocked,
                "createdAt": r.created_at,
                "creator": creator_json(r.creator_id.as_deref(), &profiles),
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
                "category": category,
                "language": language,
                "status": status,
                "visibility": visibility,
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
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    type QuizRow = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
        i64,
        i64,
        Option<String>,
        Option<String>,
        String,
    );
    let row: Option<QuizRow> = match conn
        .query_row(
            "SELECT title, description, category, language, questions, visible, blocked,
                    deleted_at, creator_id, created_at
             FROM quizzes WHERE id = ?",
            [&quiz_id],
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
        category,
        language,
        questions_raw,
        visible,
        blocked,
        deleted_at,
        creator_id,
        created_at,
    )) = row
    else {
        return err(&req.id, "not_found", "quiz not found", None);
    };

    let questions = match decode_questions(&questions_raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(quiz = %quiz_id, error = %e, "malformed questions column");
            return err(&req.id, "bad_row", "quiz has a malformed questions column", None);
        }
    };

    let creator_ids: HashSet<String> = creator_id.iter().cloned().collect();
    let profiles = or_empty(enrich::profile_summaries(conn, &creator_ids));
    let question_count = questions.len();

    ok(
        &req.id,
        json!({
            "id": quiz_id,
            "title": title,
            "description": description,
            "category": category,
            "language": language,
            "questions": questions,
            "questionCount": question_count,
            "visible": visible != 0,
            "blocked": blocked != 0,
            "deletedAt": deleted_at,
            "createdAt": created_at,
            "creator": creator_json(creator_id.as_deref(), &profiles),
        }),
    )
}

fn handle_set_visibility(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let visible = match required_bool(req, "visible") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute(
        "UPDATE quizzes SET visible = ? WHERE id = ?",
        (visible as i64, &quiz_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "quiz not found", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "visible": visible })),
        Err(e) => {
            tracing::error!(quiz = %quiz_id, error = %e, "visibility update failed");
            err(&req.id, "db_mutation_failed", "could not update quiz", None)
        }
    }
}

fn handle_set_blocked(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let blocked = match required_bool(req, "blocked") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Blocking is destructive; unblocking is not.
    if blocked {
        if let Err(e) = require_confirm(req, CONFIRM_BLOCK) {
            return e;
        }
    }

    match conn.execute(
        "UPDATE quizzes SET blocked = ? WHERE id = ?",
        (blocked as i64, &quiz_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "quiz not found", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "blocked": blocked })),
        Err(e) => {
            tracing::error!(quiz = %quiz_id, error = %e, "block update failed");
            err(&req.id, "db_mutation_failed", "could not update quiz", None)
        }
    }
}

fn handle_soft_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_confirm(req, CONFIRM_MOVE_TO_TRASH) {
        return e;
    }

    let deleted_at = now_rfc3339();
    match conn.execute(
        "UPDATE quizzes SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (&deleted_at, &quiz_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "quiz not found or already in trash", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "deletedAt": deleted_at })),
        Err(e) => {
            tracing::error!(quiz = %quiz_id, error = %e, "soft delete failed");
            err(&req.id, "db_mutation_failed", "could not move quiz to trash", None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quizzes.list" => Some(handle_list(state, req)),
        "quizzes.get" => Some(handle_get(state, req)),
        "quizzes.setVisibility" => Some(handle_set_visibility(state, req)),
        "quizzes.setBlocked" => Some(handle_set_blocked(state, req)),
        "quizzes.softDelete" => Some(handle_soft_delete(state, req)),
        _ => None,
    }
}
