use rusqlite::{params_from_iter, types::Value, Connection, Row};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Batched id lookups are chunked to keep each statement's placeholder list
/// within query-size limits.
pub const LOOKUP_CHUNK: usize = 200;

/// A failed side-lookup. Distinct from a lookup that simply matched nothing,
/// so callers (and tests) can tell "successfully empty" from "failed".
#[derive(Debug, Clone)]
pub struct EnrichmentError {
    pub table: &'static str,
    pub message: String,
}

impl EnrichmentError {
    fn new(table: &'static str, e: rusqlite::Error) -> Self {
        EnrichmentError {
            table,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enrichment lookup on {} failed: {}", self.table, self.message)
    }
}

impl std::error::Error for EnrichmentError {}

/// One batched lookup per foreign table, chunked, keyed into an id → record
/// map. `select` must contain an `{ids}` marker where the placeholder list
/// goes. Ids with no match are simply absent from the result.
pub fn fetch_by_ids<T, F>(
    conn: &Connection,
    table: &'static str,
    select: &str,
    ids: &HashSet<String>,
    mut map: F,
) -> Result<HashMap<String, T>, EnrichmentError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<(String, T)>,
{
    let mut out = HashMap::with_capacity(ids.len());
    if ids.is_empty() {
        return Ok(out);
    }

    let ids: Vec<&String> = ids.iter().collect();
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let placeholders = std::iter::repeat("?")
            .take(chunk.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = select.replace("{ids}", &placeholders);
        let binds: Vec<Value> = chunk.iter().map(|id| Value::Text((*id).clone())).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EnrichmentError::new(table, e))?;
        let mut rows = stmt
            .query(params_from_iter(binds))
            .map_err(|e| EnrichmentError::new(table, e))?;
        while let Some(row) = rows.next().map_err(|e| EnrichmentError::new(table, e))? {
            let (id, value) = map(row).map_err(|e| EnrichmentError::new(table, e))?;
            out.insert(id, value);
        }
    }
    Ok(out)
}

/// Degrades a failed lookup to an empty map so one broken side-table never
/// blocks rendering of the primary rows. The failure is logged.
pub fn or_empty<T>(result: Result<HashMap<String, T>, EnrichmentError>) -> HashMap<String, T> {
    match result {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(table = e.table, error = %e.message, "enrichment degraded to empty");
            HashMap::new()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub username: String,
    pub fullname: Option<String>,
    pub avatar_path: Option<String>,
}

pub fn profile_summaries(
    conn: &Connection,
    ids: &HashSet<String>,
) -> Result<HashMap<String, ProfileSummary>, EnrichmentError> {
    fetch_by_ids(
        conn,
        "profiles",
        "SELECT id, username, fullname, avatar_path FROM profiles WHERE id IN ({ids})",
        ids,
        |row| {
            Ok((
                row.get(0)?,
                ProfileSummary {
                    username: row.get(1)?,
                    fullname: row.get(2)?,
                    avatar_path: row.get(3)?,
                },
            ))
        },
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub title: String,
    pub category: Option<String>,
}

pub fn quiz_summaries(
    conn: &Connection,
    ids: &HashSet<String>,
) -> Result<HashMap<String, QuizSummary>, EnrichmentError> {
    fetch_by_ids(
        conn,
        "quizzes",
        "SELECT id, title, category FROM quizzes WHERE id IN ({ids})",
        ids,
        |row| {
            Ok((
                row.get(0)?,
                QuizSummary {
                    title: row.get(1)?,
                    category: row.get(2)?,
                },
            ))
        },
    )
}

/// Name lookups for countries, states and cities share a shape.
pub fn place_names(
    conn: &Connection,
    table: &'static str,
    ids: &HashSet<String>,
) -> Result<HashMap<String, String>, EnrichmentError> {
    let select = match table {
        "countries" => "SELECT id, name FROM countries WHERE id IN ({ids})",
        "states" => "SELECT id, name FROM states WHERE id IN ({ids})",
        "cities" => "SELECT id, name FROM cities WHERE id IN ({ids})",
        _ => unreachable!("place_names called for non-place table"),
    };
    fetch_by_ids(conn, table, select, ids, |row| Ok((row.get(0)?, row.get(1)?)))
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialCounts {
    pub following: i64,
    pub followers: i64,
    pub friends: i64,
}

/// Recounts social numbers from the relation tables. Used as the fallback
/// path for profiles whose denormalized counters are all zero.
pub fn social_counts(
    conn: &Connection,
    ids: &HashSet<String>,
) -> Result<HashMap<String, SocialCounts>, EnrichmentError> {
    let count_map = |select: &str| -> Result<HashMap<String, i64>, EnrichmentError> {
        fetch_by_ids(conn, "follows", select, ids, |row| Ok((row.get(0)?, row.get(1)?)))
    };

    let following = count_map(
        "SELECT follower_id, COUNT(*) FROM follows WHERE follower_id IN ({ids}) GROUP BY follower_id",
    )?;
    let followers = count_map(
        "SELECT followee_id, COUNT(*) FROM follows WHERE followee_id IN ({ids}) GROUP BY followee_id",
    )?;
    // Friendship rows are stored once per pair; count both sides.
    let friends_a = count_map(
        "SELECT user_id, COUNT(*) FROM friendships WHERE user_id IN ({ids}) GROUP BY user_id",
    )?;
    let friends_b = count_map(
        "SELECT friend_id, COUNT(*) FROM friendships WHERE friend_id IN ({ids}) GROUP BY friend_id",
    )?;

    let mut out: HashMap<String, SocialCounts> = HashMap::with_capacity(ids.len());
    for id in ids {
        let counts = SocialCounts {
            following: following.get(id).copied().unwrap_or(0),
            followers: followers.get(id).copied().unwrap_or(0),
            friends: friends_a.get(id).copied().unwrap_or(0)
                + friends_b.get(id).copied().unwrap_or(0),
        };
        out.insert(id.clone(), counts);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_profiles(n: usize) -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute(
            "CREATE TABLE profiles(
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                fullname TEXT,
                avatar_path TEXT
            )",
            [],
        )
        .expect("create table");
        for i in 0..n {
            conn.execute(
                "INSERT INTO profiles(id, username) VALUES(?, ?)",
                (format!("u{:04}", i), format!("user{:04}", i)),
            )
            .expect("insert profile");
        }
        conn
    }

    #[test]
    fn chunked_lookup_covers_more_ids_than_one_chunk() {
        let conn = conn_with_profiles(450);
        let ids: HashSet<String> = (0..450).map(|i| format!("u{:04}", i)).collect();
        let found = profile_summaries(&conn, &ids).expect("lookup");
        assert_eq!(found.len(), 450);
        assert_eq!(found["u0449"].username, "user0449");
    }

    #[test]
    fn missing_ids_are_absent_not_errors() {
        let conn = conn_with_profiles(3);
        let ids: HashSet<String> =
            ["u0001".to_string(), "ghost".to_string()].into_iter().collect();
        let found = profile_summaries(&conn, &ids).expect("lookup");
        assert_eq!(found.len(), 1);
        assert!(!found.contains_key("ghost"));
    }

    #[test]
    fn empty_id_set_issues_no_query() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        // No profiles table at all; an empty set must still succeed.
        let found = profile_summaries(&conn, &HashSet::new()).expect("lookup");
        assert!(found.is_empty());
    }

    #[test]
    fn failed_lookup_is_distinguishable_from_empty() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        let ids: HashSet<String> = ["u0001".to_string()].into_iter().collect();
        let err = profile_summaries(&conn, &ids).expect_err("missing table must fail");
        assert_eq!(err.table, "profiles");
        // ...and the tolerant path degrades it to an empty map.
        assert!(or_empty(profile_summaries(&conn, &ids)).is_empty());
    }

    #[test]
    fn social_counts_merge_both_friendship_sides() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "CREATE TABLE follows(follower_id TEXT, followee_id TEXT);
             CREATE TABLE friendships(user_id TEXT, friend_id TEXT);
             INSERT INTO follows VALUES('u1','u2'),('u1','u3'),('u3','u1');
             INSERT INTO friendships VALUES('u1','u2'),('u3','u1');",
        )
        .expect("seed");
        let ids: HashSet<String> = ["u1".to_string()].into_iter().collect();
        let counts = social_counts(&conn, &ids).expect("counts");
        let u1 = counts["u1"];
        assert_eq!(u1.following, 2);
        assert_eq!(u1.followers, 1);
        assert_eq!(u1.friends, 2);
    }
}
