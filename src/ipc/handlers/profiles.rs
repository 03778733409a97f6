use crate::assets::avatar_url;
use crate::confirm::CONFIRM_BLOCK;
use crate::enrich::{self, or_empty, SocialCounts};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, now_rfc3339, optional_str, page_params, require_confirm, required_bool, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::query::{sort_clause, ListQuery};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::{HashMap, HashSet};

const PROFILE_SORTS: &[(&str, &str)] = &[
    ("newest", "created_at DESC"),
    ("oldest", "created_at ASC"),
    ("username", "LOWER(username) ASC"),
];

const PROFILE_ROLES: &[&str] = &["user", "admin"];

struct ProfileListRow {
    id: String,
    username: String,
    fullname: Option<String>,
    email: Option<String>,
    role: String,
    blocked: bool,
    blocked_at: Option<String>,
    avatar_path: Option<String>,
    country_id: Option<String>,
    state_id: Option<String>,
    city_id: Option<String>,
    following_count: i64,
    followers_count: i64,
    friends_count: i64,
    created_at: String,
}

impl ProfileListRow {
    /// The denormalized counters are trusted unless every one of them is
    /// zero, in which case the relation tables are recounted.
    fn needs_social_fallback(&self) -> bool {
        self.following_count == 0 && self.followers_count == 0 && self.friends_count == 0
    }
}

fn location_json(
    row: &ProfileListRow,
    countries: &HashMap<String, String>,
    states: &HashMap<String, String>,
    cities: &HashMap<String, String>,
) -> serde_json::Value {
    let name_of = |id: &Option<String>, names: &HashMap<String, String>| {
        id.as_deref()
            .map(|i| names.get(i).cloned().unwrap_or_else(|| "-".to_string()))
    };
    json!({
        "country": name_of(&row.country_id, countries),
        "state": name_of(&row.state_id, states),
        "city": name_of(&row.city_id, cities),
    })
}

fn social_json(row: &ProfileListRow, fallback: &HashMap<String, SocialCounts>) -> serde_json::Value {
    if row.needs_social_fallback() {
        let counts = fallback.get(&row.id).copied().unwrap_or_default();
        json!({
            "following": counts.following,
            "followers": counts.followers,
            "friends": counts.friends,
        })
    } else {
        json!({
            "following": row.following_count,
            "followers": row.followers_count,
            "friends": row.friends_count,
        })
    }
}

fn profile_row_json(
    row: &ProfileListRow,
    countries: &HashMap<String, String>,
    states: &HashMap<String, String>,
    cities: &HashMap<String, String>,
    fallback: &HashMap<String, SocialCounts>,
) -> serde_json::Value {
    json!({
        "id": row.id,
        "username": row.username,
        "fullname": row.fullname,
        "email": row.email,
        "role": row.role,
        "blocked": row.blocked,
        "blockedAt": row.blocked_at,
        "avatarUrl": avatar_url(row.avatar_path.as_deref(), &row.username),
        "location": location_json(row, countries, states, cities),
        "social": social_json(row, fallback),
        "createdAt": row.created_at,
    })
}

fn map_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<ProfileListRow>> {
    Ok(Some(ProfileListRow {
        id: row.get("id")?,
        username: row.get("username")?,
        fullname: row.get("fullname")?,
        email: row.get("email")?,
        role: row.get("role")?,
        blocked: row.get::<_, i64>("blocked")? != 0,
        blocked_at: row.get("blocked_at")?,
        avatar_path: row.get("avatar_path")?,
        country_id: row.get("country_id")?,
        state_id: row.get("state_id")?,
        city_id: row.get("city_id")?,
        following_count: row.get("following_count")?,
        followers_count: row.get("followers_count")?,
        friends_count: row.get("friends_count")?,
        created_at: row.get("created_at")?,
    }))
}

struct ProfileEnrichment {
    countries: HashMap<String, String>,
    states: HashMap<String, String>,
    cities: HashMap<String, String>,
    social_fallback: HashMap<String, SocialCounts>,
}

fn enrich_profiles(conn: &rusqlite::Connection, rows: &[ProfileListRow]) -> ProfileEnrichment {
    let country_ids: HashSet<String> = rows.iter().filter_map(|r| r.country_id.clone()).collect();
    let state_ids: HashSet<String> = rows.iter().filter_map(|r| r.state_id.clone()).collect();
    let city_ids: HashSet<String> = rows.iter().filter_map(|r| r.city_id.clone()).collect();
    let fallback_ids: HashSet<String> = rows
        .iter()
        .filter(|r| r.needs_social_fallback())
        .map(|r| r.id.clone())
        .collect();

    ProfileEnrichment {
        countries: or_empty(enrich::place_names(conn, "countries", &country_ids)),
        states: or_empty(enrich::place_names(conn, "states", &state_ids)),
        cities: or_empty(enrich::place_names(conn, "cities", &city_ids)),
        social_fallback: or_empty(enrich::social_counts(conn, &fallback_ids)),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (page, page_size) = page_params(req);
    let search = optional_str(req, "search");
    let role = optional_str(req, "role");
    let status = optional_str(req, "status");
    let sort = optional_str(req, "sort");

    let blocked_filter = match status.as_deref() {
        Some("active") => Some(false),
        Some("blocked") => Some(true),
        _ => None,
    };

    let result = ListQuery::new("profiles")
        .search(&["username", "fullname", "email"], search.as_deref())
        .filter_eq("role", role.as_deref())
        .filter_flag("blocked", blocked_filter)
        .order_by(sort_clause(sort.as_deref(), PROFILE_SORTS, "created_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, map_profile_row);

    let enrichment = enrich_profiles(conn, &result.data);

    let data: Vec<serde_json::Value> = result
        .data
        .iter()
        .map(|r| {
            profile_row_json(
                r,
                &enrichment.countries,
                &enrichment.states,
                &enrichment.cities,
                &enrichment.social_fallback,
            )
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
                "role": role,
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
    let profile_id = match required_str(req, "profileId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row: Option<ProfileListRow> = match conn
        .query_row(
            "SELECT * FROM profiles WHERE id = ?",
            [&profile_id],
            |r| map_profile_row(r),
        )
        .optional()
    {
        Ok(v) => v.flatten(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(row) = row else {
        return err(&req.id, "not_found", "profile not found", None);
    };

    let rows = [row];
    let enrichment = enrich_profiles(conn, &rows);
    ok(
        &req.id,
        profile_row_json(
            &rows[0],
            &enrichment.countries,
            &enrichment.states,
            &enrichment.cities,
            &enrichment.social_fallback,
        ),
    )
}

fn handle_set_role(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let profile_id = match required_str(req, "profileId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !PROFILE_ROLES.contains(&role.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: user, admin",
            Some(json!({ "role": role })),
        );
    }

    match conn.execute(
        "UPDATE profiles SET role = ? WHERE id = ?",
        (&role, &profile_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "profile not found", None),
        Ok(_) => ok(&req.id, json!({ "updated": true, "role": role })),
        Err(e) => {
            tracing::error!(profile = %profile_id, error = %e, "role update failed");
            err(&req.id, "db_mutation_failed", "could not update profile", None)
        }
    }
}

fn handle_set_blocked(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let profile_id = match required_str(req, "profileId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let blocked = match required_bool(req, "blocked") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if blocked {
        if let Err(e) = require_confirm(req, CONFIRM_BLOCK) {
            return e;
        }
    }

    let blocked_at = if blocked { Some(now_rfc3339()) } else { None };
    match conn.execute(
        "UPDATE profiles SET blocked = ?, blocked_at = ? WHERE id = ?",
        (blocked as i64, &blocked_at, &profile_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "profile not found", None),
        Ok(_) => ok(
            &req.id,
            json!({ "updated": true, "blocked": blocked, "blockedAt": blocked_at }),
        ),
        Err(e) => {
            tracing::error!(profile = %profile_id, error = %e, "block update failed");
            err(&req.id, "db_mutation_failed", "could not update profile", None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profiles.list" => Some(handle_list(state, req)),
        "profiles.get" => Some(handle_get(state, req)),
        "profiles.setRole" => Some(handle_set_role(state, req)),
        "profiles.setBlocked" => Some(handle_set_blocked(state, req)),
        _ => None,
    }
}
