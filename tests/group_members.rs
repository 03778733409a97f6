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

fn seed_group(workspace: &PathBuf) {
    use rusqlite::Connection;
    let conn = Connection::open(db_path(workspace)).expect("open db");
    for (id, username) in [("u1", "ada"), ("u2", "brian"), ("u3", "clara")] {
        conn.execute(
            "INSERT INTO profiles(id, username, created_at) VALUES(?, ?, '2026-01-01T00:00:00Z')",
            (id, username),
        )
        .expect("profile");
    }
    let members = json!([
        { "userId": "u1", "role": "owner", "joinedAt": "2026-01-01T00:00:00Z" },
        { "userId": "u2", "role": "member", "joinedAt": "2026-01-02T00:00:00Z" },
        { "userId": "u3", "role": "member", "joinedAt": "2026-01-03T00:00:00Z" }
    ]);
    conn.execute(
        "INSERT INTO groups(id, name, description, creator_id, members, created_at)
         VALUES('g1', 'Study Circle', 'Weekly trivia practice', 'u1', ?, '2026-01-01T00:00:00Z')",
        [members.to_string()],
    )
    .expect("group");
}

#[test]
fn member_role_change_persists_and_bumps_the_version() {
    let workspace = temp_dir("quizadmind-groups");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_group(&workspace);

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.get",
        json!({ "groupId": "g1" }),
    );
    assert_eq!(detail["version"], 0);
    assert_eq!(detail["memberCount"], 3);
    assert_eq!(detail["members"][1]["username"], "brian");
    assert_eq!(detail["members"][1]["role"], "member");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "groups.updateMemberRole",
        json!({ "groupId": "g1", "userId": "u2", "role": "admin" }),
    );
    assert_eq!(updated["role"], "admin");
    assert_eq!(updated["version"], 1);

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "groups.get",
        json!({ "groupId": "g1" }),
    );
    assert_eq!(detail["version"], 1);
    assert_eq!(detail["members"][1]["role"], "admin");
    // The other members are untouched.
    assert_eq!(detail["members"][0]["role"], "owner");
    assert_eq!(detail["members"][2]["role"], "member");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_roles_and_absent_members_are_rejected() {
    let workspace = temp_dir("quizadmind-groups-bad");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_group(&workspace);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "groups.updateMemberRole",
        json!({ "groupId": "g1", "userId": "u2", "role": "superadmin" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "groups.updateMemberRole",
        json!({ "groupId": "g1", "userId": "nobody", "role": "admin" }),
    );
    assert_eq!(resp["error"]["code"], "not_found");

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "groups.removeMember",
        json!({ "groupId": "g1", "userId": "nobody" }),
    );
    assert_eq!(resp["error"]["code"], "not_found");

    // Failed attempts never advance the version.
    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "groups.get",
        json!({ "groupId": "g1" }),
    );
    assert_eq!(detail["version"], 0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn remove_member_drops_exactly_one_entry() {
    let workspace = temp_dir("quizadmind-groups-remove");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_group(&workspace);

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.removeMember",
        json!({ "groupId": "g1", "userId": "u2" }),
    );
    assert_eq!(removed["removedUserId"], "u2");
    assert_eq!(removed["memberCount"], 2);
    assert_eq!(removed["version"], 1);

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "groups.get",
        json!({ "groupId": "g1" }),
    );
    let usernames: Vec<&str> = detail["members"]
        .as_array()
        .expect("members")
        .iter()
        .map(|m| m["username"].as_str().expect("username"))
        .collect();
    assert_eq!(usernames, ["ada", "clara"]);

    // The list view reflects the recount.
    let list = request_ok(&mut stdin, &mut reader, "4", "groups.list", json!({}));
    assert_eq!(list["data"][0]["memberCount"], 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn trashed_groups_refuse_member_edits() {
    let workspace = temp_dir("quizadmind-groups-trashed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_group(&workspace);

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.softDelete",
        json!({ "groupId": "g1", "confirm": "Move to Trash" }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "groups.updateMemberRole",
        json!({ "groupId": "g1", "userId": "u2", "role": "admin" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
}
