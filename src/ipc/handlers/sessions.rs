use crate::assets::avatar_url;
use crate::enrich::{self, or_empty};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, page_params, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{decode_participants, Participant};
use crate::query::{sort_clause, ListQuery};
use crate::stats::{histogram, participant_stats, session_duration_minutes, top_n};
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::{HashMap, HashSet};

const DURATION_EXPR: &str =
    "COALESCE(total_time_minutes, (julianday(ended_at) - julianday(started_at)) * 1440)";

fn session_sorts() -> Vec<(&'static str, String)> {
    vec![
        ("newest", "created_at DESC".to_string()),
        ("oldest", "created_at ASC".to_string()),
        ("duration_desc", format!("{} DESC", DURATION_EXPR)),
        ("duration_asc", format!("{} ASC", DURATION_EXPR)),
    ]
}

struct SessionListRow {
    id: String,
    game_pin: String,
    host_id: Option<String>,
    quiz_id: Option<String>,
    status: String,
    participants: Vec<Participant>,
    started_at: Option<String>,
    ended_at: Option<String>,
    total_time_minutes: Option<i64>,
    application: Option<String>,
    created_at: String,
}

fn host_json(
    host_id: Option<&str>,
    profiles: &HashMap<String, enrich::ProfileSummary>,
) -> serde_json::Value {
    let Some(host_id) = host_id else {
        return serde_json::Value::Null;
    };
    match profiles.get(host_id) {
        Some(p) => json!({
            "id": host_id,
            "username": p.username,
            "avatarUrl": avatar_url(p.avatar_path.as_deref(), &p.username),
        }),
        None => json!({
            "id": host_id,
            "username": "Unknown",
            "avatarUrl": avatar_url(None, host_id),
        }),
    }
}

fn quiz_json(
    quiz_id: Option<&str>,
    quizzes: &HashMap<String, enrich::QuizSummary>,
) -> serde_json::Value {
    let Some(quiz_id) = quiz_id else {
        return serde_json::Value::Null;
    };
    match quizzes.get(quiz_id) {
        Some(q) => json!({
            "id": quiz_id,
            "title": q.title,
            "category": q.category,
        }),
        None => json!({
            "id": quiz_id,
            "title": "Unknown",
            "category": serde_json::Value::Null,
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
    let status = optional_str(req, "status");
    let application = optional_str(req, "application");
    let category = optional_str(req, "category");
    let sort = optional_str(req, "sort");

    let sorts = session_sorts();
    let sort_choices: Vec<(&str, &str)> =
        sorts.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let result = ListQuery::new("game_sessions")
        .search(&["game_pin"], search.as_deref())
        .filter_eq("status", status.as_deref())
        .filter_eq("application", application.as_deref())
        .filter_subquery(
            "quiz_id IN (SELECT id FROM quizzes WHERE category = ?)",
            category.as_deref(),
        )
        .order_by(sort_clause(sort.as_deref(), &sort_choices, "created_at DESC"))
        .paginate(page, page_size)
        .fetch_or_empty(conn, |row| {
            let id: String = row.get("id")?;
            let participants_raw: String = row.get("participants")?;
            let participants = match decode_participants(&participants_raw) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(session = %id, error = %e, "skipping session with malformed participants");
                    return Ok(None);
                }
            };
            Ok(Some(SessionListRow {
                id,
                game_pin: row.get("game_pin")?,
                host_id: row.get("host_id")?,
                quiz_id: row.get("quiz_id")?,
                status: row.get("status")?,
                participants,
                started_at: row.get("started_at")?,
                ended_at: row.get("ended_at")?,
                total_time_minutes: row.get("total_time_minutes")?,
                application: row.get("application")?,
                created_at: row.get("created_at")?,
            }))
        });

    let host_ids: HashSet<String> = result.data.iter().filter_map(|r| r.host_id.clone()).collect();
    let quiz_ids: HashSet<String> = result.data.iter().filter_map(|r| r.quiz_id.clone()).collect();
    let profiles = or_empty(enrich::profile_summaries(conn, &host_ids));
    let quizzes = or_empty(enrich::quiz_summaries(conn, &quiz_ids));

    let data: Vec<serde_json::Value> = result
        .data
        .iter()
        .map(|r| {
            let stats = participant_stats(&r.participants);
            let duration = session_duration_minutes(
                r.started_at.as_deref(),
                r.ended_at.as_deref(),
                r.total_time_minutes,
            );
            json!({
                "id": r.id,
                "gamePin": r.game_pin,
                "status": r.status,
                "application": r.application,
                "startedAt": r.started_at,
                "endedAt": r.ended_at,
                "createdAt": r.created_at,
                "durationMinutes": duration,
                "participantCount": stats.count,
                "avgScore": stats.avg_score,
                "maxScore": stats.max_score,
                "host": host_json(r.host_id.as_deref(), &profiles),
                "quiz": quiz_json(r.quiz_id.as_deref(), &quizzes),
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
                "application": application,
                "category": category,
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
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    type SessionRow = (
        String,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<i64>,
        Option<String>,
        String,
    );
    let row: Option<SessionRow> = match conn
        .query_row(
            "SELECT game_pin, host_id, quiz_id, status, participants, started_at, ended_at,
                    total_time_minutes, application, created_at
             FROM game_sessions WHERE id = ?",
            [&session_id],
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
        game_pin,
        host_id,
        quiz_id,
        status,
        participants_raw,
        started_at,
        ended_at,
        total_time_minutes,
        application,
        created_at,
    )) = row
    else {
        return err(&req.id, "not_found", "session not found", None);
    };

    let participants = match decode_participants(&participants_raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "malformed participants column");
            return err(&req.id, "bad_row", "session has a malformed participants column", None);
        }
    };

    let host_ids: HashSet<String> = host_id.iter().cloned().collect();
    let quiz_ids: HashSet<String> = quiz_id.iter().cloned().collect();
    let participant_ids: HashSet<String> = participants
        .iter()
        .filter_map(|p| p.user_id.clone())
        .collect();
    let mut lookup_ids = host_ids.clone();
    lookup_ids.extend(participant_ids);
    let profiles = or_empty(enrich::profile_summaries(conn, &lookup_ids));
    let quizzes = or_empty(enrich::quiz_summaries(conn, &quiz_ids));

    let stats = participant_stats(&participants);
    let duration =
        session_duration_minutes(started_at.as_deref(), ended_at.as_deref(), total_time_minutes);

    let participants_json: Vec<serde_json::Value> = participants
        .iter()
        .map(|p| {
            // Participant's own avatar wins; else the linked profile's; else
            // the nickname-seeded placeholder.
            let profile_avatar = p
                .user_id
                .as_deref()
                .and_then(|uid| profiles.get(uid))
                .and_then(|prof| prof.avatar_path.clone());
            let avatar = p.avatar.clone().or(profile_avatar);
            json!({
                "userId": p.user_id,
                "nickname": p.nickname,
                "score": p.score,
                "avatarUrl": avatar_url(avatar.as_deref(), &p.nickname),
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "id": session_id,
            "gamePin": game_pin,
            "status": status,
            "application": application,
            "startedAt": started_at,
            "endedAt": ended_at,
            "createdAt": created_at,
            "durationMinutes": duration,
            "participantCount": stats.count,
            "avgScore": stats.avg_score,
            "maxScore": stats.max_score,
            "participants": participants_json,
            "host": host_json(host_id.as_deref(), &profiles),
            "quiz": quiz_json(quiz_id.as_deref(), &quizzes),
        }),
    )
}

fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let rows: Vec<(String, Option<String>, Option<String>)> = {
        let mut stmt = match conn
            .prepare("SELECT status, quiz_id, host_id FROM game_sessions")
        {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let status_histogram = histogram(rows.iter().map(|(s, _, _)| Some(s.as_str())));

    let mut quiz_counts: HashMap<String, i64> = HashMap::new();
    let mut host_counts: HashMap<String, i64> = HashMap::new();
    for (_, quiz_id, host_id) in &rows {
        if let Some(q) = quiz_id {
            *quiz_counts.entry(q.clone()).or_insert(0) += 1;
        }
        if let Some(h) = host_id {
            *host_counts.entry(h.clone()).or_insert(0) += 1;
        }
    }

    let quiz_ids: HashSet<String> = quiz_counts.keys().cloned().collect();
    let host_ids: HashSet<String> = host_counts.keys().cloned().collect();
    let quizzes = or_empty(enrich::quiz_summaries(conn, &quiz_ids));
    let profiles = or_empty(enrich::profile_summaries(conn, &host_ids));

    let category_histogram = histogram(rows.iter().map(|(_, quiz_id, _)| {
        quiz_id
            .as_deref()
            .and_then(|q| quizzes.get(q))
            .and_then(|q| q.category.as_deref())
    }));

    let top_quizzes: Vec<serde_json::Value> = top_n(&quiz_counts, 5)
        .into_iter()
        .map(|(quiz_id, count)| {
            let title = quizzes
                .get(&quiz_id)
                .map(|q| q.title.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            json!({ "quizId": quiz_id, "title": title, "sessionCount": count })
        })
        .collect();
    let top_hosts: Vec<serde_json::Value> = top_n(&host_counts, 5)
        .into_iter()
        .map(|(host_id, count)| {
            let username = profiles
                .get(&host_id)
                .map(|p| p.username.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            json!({ "hostId": host_id, "username": username, "sessionCount": count })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "totalSessions": rows.len(),
            "statusHistogram": status_histogram,
            "categoryHistogram": category_histogram,
            "topQuizzes": top_quizzes,
            "topHosts": top_hosts,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.list" => Some(handle_list(state, req)),
        "sessions.get" => Some(handle_get(state, req)),
        "sessions.overview" => Some(handle_overview(state, req)),
        _ => None,
    }
}
