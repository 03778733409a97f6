use crate::confirm::CONFIRM_DELETE_PERMANENTLY;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, page_params, require_confirm, required_str};
use crate::ipc::types::{AppState, Request};
use crate::query::{sort_clause, ListQuery};
use crate::stats::{days_until_purge, parse_timestamp};
use chrono::Utc;
use serde_json::json;

const TRASH_SORTS: &[(&str, &str)] = &[
    ("newest", "deleted_at DESC"),
    ("oldest", "deleted_at ASC"),
    ("expiring", "deleted_at ASC"),
];

/// Soft-deletable entities this screen serves.
struct TrashEntity {
    table: &'static str,
    label_column: &'static str,
    search_columns: &'static [&'static str],
}

fn resolve_entity(req: &Request) -> Result<TrashEntity, serde_json::Value> {
    let entity = required_str(req, "entity")?;
    match entity.as_str() {
        "quizzes" => Ok(TrashEntity {
            table: "quizzes",
            label_column: "title",
            search_columns: &["title", "description"],
        }),
        "groups" => Ok(TrashEntity {
            table: "groups",
            label_column: "name",
            search_columns: &["name", "description"],
        }),
        other => Err(err(
            &req.id,
            "bad_params",
            "entity must be one of: quizzes, groups",
            Some(json!({ "entity": other })),
        )),
    }
}

struct TrashRow {
    id: String,
    label: String,
    deleted_at: String,
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entity = match resolve_entity(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (page, page_size) = page_params(req);
    let search = optional_str(req, "search");
    let sort = optional_str(req, "sort");

    let label_column = entity.label_column;
    let result = ListQuery::new(entity.table)
        .in_trash(true)
        .search(entity.search_columns, search.as_deref())
        .order_by(sort_clause(sort.as_deref(), TRASH_SORTS, "deleted_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, |row| {
            Ok(Some(TrashRow {
                id: row.get("id")?,
                label: row.get(label_column)?,
                deleted_at: row.get("deleted_at")?,
            }))
        });

    let now = Utc::now();
    let data: Vec<serde_json::Value> = result
        .data
        .iter()
        .map(|r| {
            let days_left = parse_timestamp(&r.deleted_at).map(|d| days_until_purge(d, now));
            json!({
                "id": r.id,
                "label": r.label,
                "entity": entity.table,
                "deletedAt": r.deleted_at,
                "daysLeft": days_left,
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
                "entity": entity.table,
                "search": search,
                "sort": sort,
            },
        }),
    )
}

fn handle_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entity = match resolve_entity(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!(
        "UPDATE {} SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        entity.table
    );
    match conn.execute(&sql, [&id]) {
        Ok(0) => err(&req.id, "not_found", "row not found in trash", None),
        Ok(_) => ok(&req.id, json!({ "restored": true, "id": id })),
        Err(e) => {
            tracing::error!(entity = entity.table, id = %id, error = %e, "restore failed");
            err(&req.id, "db_mutation_failed", "could not restore row", None)
        }
    }
}

fn handle_purge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entity = match resolve_entity(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_confirm(req, CONFIRM_DELETE_PERMANENTLY) {
        return e;
    }

    // Only rows already in the trash may be purged.
    let sql = format!(
        "DELETE FROM {} WHERE id = ? AND deleted_at IS NOT NULL",
        entity.table
    );
    match conn.execute(&sql, [&id]) {
        Ok(0) => err(&req.id, "not_found", "row not found in trash", None),
        Ok(_) => ok(&req.id, json!({ "purged": true, "id": id })),
        Err(e) => {
            tracing::error!(entity = entity.table, id = %id, error = %e, "purge failed");
            err(&req.id, "db_mutation_failed", "could not delete row", None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "trash.list" => Some(handle_list(state, req)),
        "trash.restore" => Some(handle_restore(state, req)),
        "trash.purge" => Some(handle_purge(state, req)),
        _ => None,
    }
}
