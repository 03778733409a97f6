use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_quizadmind");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn quizadmind");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn db_path(workspace: &PathBuf) -> PathBuf {
    workspace.join("quizadmin.sqlite3")
}

fn seed_profiles(workspace: &PathBuf) {
    use rusqlite::Connection;
    let conn = Connection::open(db_path(workspace)).expect("open db");
    conn.execute("INSERT INTO countries(id, name) VALUES('c1', 'Brazil')", [])
        .expect("country");
    conn.execute(
        "INSERT INTO states(id, country_id, name) VALUES('s1', 'c1', 'Bahia')",
        [],
    )
    .expect("state");
    conn.execute(
        "INSERT INTO cities(id, state_id, name) VALUES('ct1', 's1', 'Salvador')",
        [],
    )
    .expect("city");

    // Trusted denormalized counters and a full location.
    conn.execute(
        "INSERT INTO profiles(id, username, fullname, email, country_id, state_id, city_id,
                              following_count, followers_count, friends_count, created_at)
         VALUES('u1', 'ada', 'Ada L.', 'ada@example.com', 'c1', 's1', 'ct1',
                7, 12, 3, '2026-01-01T00:00:00Z')",
        [],
    )
    .expect("u1");
    // All counters at zero forces a recount from the relation tables.
    conn.execute(
        "INSERT INTO profiles(id, username, country_id, created_at)
         VALUES('u2', 'brian', 'missing-country', '2026-01-02T00:00:00Z')",
        [],
    )
    .expect("u2");

    conn.execute(
        "INSERT INTO follows(follower_id, followee_id) VALUES('u2', 'u1')",
        [],
    )
    .expect("follow out");
    conn.execute(
        "INSERT INTO follows(follower_id, followee_id) VALUES('u1', 'u2')",
        [],
    )
    .expect("follow in");
    conn.execute(
        "INSERT INTO friendships(user_id, friend_id) VALUES('u1', 'u2')",
        [],
    )
    .expect("friendship");
}

#[test]
fn locations_resolve_to_names_and_missing_places_dash() {
    let workspace = temp_dir("quizadmind-profiles");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_profiles(&workspace);

    let ada = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "profiles.get",
        json!({ "profileId": "u1" }),
    );
    assert_eq!(ada["location"]["country"], "Brazil");
    assert_eq!(ada["location"]["state"], "Bahia");
    assert_eq!(ada["location"]["city"], "Salvador");

    // A dangling place reference renders a dash, a missing one renders null.
    let brian = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "profiles.get",
        json!({ "profileId": "u2" }),
    );
    assert_eq!(brian["location"]["country"], "-");
    assert!(brian["location"]["state"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn zero_counters_fall_back_to_relation_tables() {
    let workspace = temp_dir("quizadmind-profiles-social");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_profiles(&workspace);

    // Nonzero denormalized counters are reported as stored.
    let ada = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "profiles.get",
        json!({ "profileId": "u1" }),
    );
    assert_eq!(ada["social"]["following"], 7);
    assert_eq!(ada["social"]["followers"], 12);
    assert_eq!(ada["social"]["friends"], 3);

    // brian's counters are all zero, so the relation tables win.
    let brian = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "profiles.get",
        json!({ "profileId": "u2" }),
    );
    assert_eq!(brian["social"]["following"], 1);
    assert_eq!(brian["social"]["followers"], 1);
    assert_eq!(brian["social"]["friends"], 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn role_and_status_filters_narrow_the_list() {
    let workspace = temp_dir("quizadmind-profiles-filters");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_profiles(&workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "profiles.setRole",
        json!({ "profileId": "u1", "role": "admin" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "profiles.setRole",
        json!({ "profileId": "u2", "role": "moderator" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_params");

    let admins = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "profiles.list",
        json!({ "role": "admin" }),
    );
    assert_eq!(admins["totalCount"], 1);
    assert_eq!(admins["data"][0]["username"], "ada");

    let active = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "profiles.list",
        json!({ "status": "active" }),
    );
    assert_eq!(active["totalCount"], 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn blocking_requires_the_literal_and_stamps_the_time() {
    let workspace = temp_dir("quizadmind-profiles-block");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_profiles(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "profiles.setBlocked",
        json!({ "profileId": "u1", "blocked": true, "confirm": "block" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "confirmation_required");
    assert_eq!(resp["error"]["details"]["required"], "Block");

    let blocked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "profiles.setBlocked",
        json!({ "profileId": "u1", "blocked": true, "confirm": "Block" }),
    );
    assert_eq!(blocked["blocked"], true);
    assert!(blocked["blockedAt"].as_str().expect("ts").contains('T'));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "profiles.list",
        json!({ "status": "blocked" }),
    );
    assert_eq!(listed["totalCount"], 1);
    assert_eq!(listed["data"][0]["username"], "ada");

    // Unblocking needs no confirmation and clears the stamp.
    let unblocked = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "profiles.setBlocked",
        json!({ "profileId": "u1", "blocked": false }),
    );
    assert_eq!(unblocked["blocked"], false);
    assert!(unblocked["blockedAt"].is_null());

    drop(stdin);
    let _ = child.wait();
}
