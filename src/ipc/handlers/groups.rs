use crate::assets::{avatar_url, public_asset_url};
use crate::confirm::CONFIRM_MOVE_TO_TRASH;
use crate::enrich::{self, or_empty};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, now_rfc3339, optional_str, page_params, require_confirm, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{decode_members, GroupMember, MemberRole};
use crate::query::{sort_clause, ListQuery};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;

const GROUP_SORTS: &[(&str, &str)] = &[
    ("newest", "created_at DESC"),
    ("oldest", "created_at ASC"),
    ("name", "LOWER(name) ASC"),
];

struct GroupListRow {
    id: String,
    name: String,
    description: Option<String>,
    avatar_path: Option<String>,
    creator_id: Option<String>,
    member_count: usize,
    status: String,
    location: Option<String>,
    created_at: String,
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (page, page_size) = page_params(req);
    let search = optional_str(req, "search");
    let status = optional_str(req, "status");
    let sort = optional_str(req, "sort");

    let result = ListQuery::new("groups")
        .in_trash(false)
        .search(&["name", "description"], search.as_deref())
        .filter_eq("status", status.as_deref())
        .order_by(sort_clause(sort.as_deref(), GROUP_SORTS, "created_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, |row| {
            let id: String = row.get("id")?;
            let members_raw: String = row.get("members")?;
            let member_count = match decode_members(&members_raw) {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::warn!(group = %id, error = %e, "skipping group with malformed members");
                    return Ok(None);
                }
            };
            Ok(Some(GroupListRow {
                id,
                name: row.get("name")?,
                description: row.get("description")?,
                avatar_path: row.get("avatar_path")?,
                creator_id: row.get("creator_id")?,
                member_count,
                status: row.get("status")?,
                location: row.get("location")?,
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
            let creator = r.creator_id.as_deref().map(|cid| {
                let username = profiles
                    .get(cid)
                    .map(|p| p.username.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                json!({ "id": cid, "username": username })
            });
            json!({
                "id": r.id,
                "name": r.name,
                "description": r.description,
                "avatarUrl": public_asset_url(r.avatar_path.as_deref()),
                "memberCount": r.member_count,
                "status": r.status,
                "location": r.location,
                "createdAt": r.created_at,
                "creator": creator,
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
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    type GroupRow = (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        Option<String>,
        String,
        i64,
    );
    let row: Option<GroupRow> = match conn
        .query_row(
            "SELECT name, description, avatar_path, cover_path, creator_id, members, status,
                    location, deleted_at, created_at, version
             FROM groups WHERE id = ?",
            [&group_id],
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
        name,
        description,
        avatar_path,
        cover_path,
        creator_id,
        members_raw,
        status,
        location,
        deleted_at,
        created_at,
        version,
    )) = row
    else {
        return err(&req.id, "not_found", "group not found", None);
    };

    let members = match decode_members(&members_raw) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(group = %group_id, error = %e, "malformed members column");
            return err(&req.id, "bad_row", "group has a malformed members column", None);
        }
    };

    let mut lookup_ids: HashSet<String> = members.iter().map(|m| m.user_id.clone()).collect();
    lookup_ids.extend(creator_id.iter().cloned());
    let profiles = or_empty(enrich::profile_summaries(conn, &lookup_ids));

    let members_json: Vec<serde_json::Value> = members
        .iter()
        .map(|m| match profiles.get(&m.user_id) {
            Some(p) => json!({
                "userId": m.user_id,
                "role": m.role,
                "joinedAt": m.joined_at,
                "username": p.username,
                "fullname": p.fullname,
                "avatarUrl": avatar_url(p.avatar_path.as_deref(), &p.username),
            }),
            None => json!({
                "userId": m.user_id,
                "role": m.role,
                "joinedAt": m.joined_at,
                "username": "Unknown",
                "fullname": serde_json::Value::Null,
                "avatarUrl": avatar_url(None, &m.user_id),
            }),
        })
        .collect();

    let creator = creator_id.as_deref().map(|cid| {
        let username = profiles
            .get(cid)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        json!({ "id": cid, "username": username })
    });

    ok(
        &req.id,
        json!({
            "id": group_id,
            "name": name,
            "description": description,
            "avatarUrl": public_asset_url(avatar_path.as_deref()),
            "coverUrl": public_asset_url(cover_path.as_deref()),
            "status": status,
            "location": location,
            "deletedAt": deleted_at,
            "createdAt": created_at,
            "version": version,
            "memberCount": members_json.len(),
            "members": members_json,
            "creator": creator,
        }),
    )
}

/// Reads the member list plus its version for a compare-and-swap edit.
fn load_members(
    conn: &Connection,
    req: &Request,
    group_id: &str,
) -> Result<(Vec<GroupMember>, i64), serde_json::Value> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT members, version FROM groups WHERE id = ? AND deleted_at IS NULL",
            [group_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let Some((members_raw, version)) = row else {
        return Err(err(&req.id, "not_found", "group not found", None));
    };
    let members = decode_members(&members_raw).map_err(|e| {
        tracing::error!(group = %group_id, error = %e, "malformed members column");
        err(&req.id, "bad_row", "group has a malformed members column", None)
    })?;
    Ok((members, version))
}

/// Writes the member list back, guarded on the version read earlier. Zero
/// affected rows means a concurrent edit won.
fn store_members(
    conn: &Connection,
    req: &Request,
    group_id: &str,
    members: &[GroupMember],
    expected_version: i64,
) -> Result<i64, serde_json::Value> {
    let encoded = serde_json::to_string(members)
        .map_err(|e| err(&req.id, "db_mutation_failed", e.to_string(), None))?;
    let affected = conn
        .execute(
            "UPDATE groups SET members = ?, version = version + 1
             WHERE id = ? AND version = ?",
            (&encoded, group_id, expected_version),
        )
        .map_err(|e| {
            tracing::error!(group = %group_id, error = %e, "member list update failed");
            err(&req.id, "db_mutation_failed", "could not update members", None)
        })?;
    if affected == 0 {
        return Err(err(
            &req.id,
            "conflict",
            "group was modified concurrently, reload and retry",
            None,
        ));
    }
    Ok(expected_version + 1)
}

fn handle_update_member_role(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role_raw = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(role) = MemberRole::parse(&role_raw) else {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: owner, admin, member",
            Some(json!({ "role": role_raw })),
        );
    };

    let (mut members, version) = match load_members(conn, req, &group_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(member) = members.iter_mut().find(|m| m.user_id == user_id) else {
        return err(&req.id, "not_found", "member not found in group", None);
    };
    member.role = role;

    match store_members(conn, req, &group_id, &members, version) {
        Ok(new_version) => ok(
            &req.id,
            json!({
                "updated": true,
                "userId": user_id,
                "role": role.as_str(),
                "version": new_version,
            }),
        ),
        Err(e) => e,
    }
}

fn handle_remove_member(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let (mut members, version) = match load_members(conn, req, &group_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before = members.len();
    members.retain(|m| m.user_id != user_id);
    if members.len() == before {
        return err(&req.id, "not_found", "member not found in group", None);
    }

    match store_members(conn, req, &group_id, &members, version) {
        Ok(new_version) => ok(
            &req.id,
            json!({
                "updated": true,
                "removedUserId": user_id,
                "memberCount": members.len(),
                "version": new_version,
            }),
        ),
        Err(e) => e,
    }
}

fn handle_soft_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_confirm(req, CONFIRM_MOVE_TO_TRASH) {
        return e;
    }

    let deleted_at = now_rfc3339();
    match conn.execute(
        "UPDATE groups SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        (&deleted_at, &group_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "group not found or already in trash", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "deletedAt": deleted_at })),
        Err(e) => {
            tracing::error!(group = %group_id, error = %e, "soft delete failed");
            err(&req.id, "db_mutation_failed", "could not move group to trash", None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "groups.list" => Some(handle_list(state, req)),
        "groups.get" => Some(handle_get(state, req)),
        "groups.updateMemberRole" => Some(handle_update_member_role(state, req)),
        "groups.removeMember" => Some(handle_remove_member(state, req)),
        "groups.softDelete" => Some(handle_soft_delete(state, req)),
        _ => None,
    }
}
