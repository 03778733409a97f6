use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("quizadmin.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS countries(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS states(
            id TEXT PRIMARY KEY,
            country_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(country_id) REFERENCES countries(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cities(
            id TEXT PRIMARY KEY,
            state_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(state_id) REFERENCES states(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            fullname TEXT,
            email TEXT,
            role TEXT NOT NULL DEFAULT 'user',
            blocked INTEGER NOT NULL DEFAULT 0,
            blocked_at TEXT,
            avatar_path TEXT,
            country_id TEXT,
            state_id TEXT,
            city_id TEXT,
            following_count INTEGER NOT NULL DEFAULT 0,
            followers_count INTEGER NOT NULL DEFAULT 0,
            friends_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_username ON profiles(username)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS follows(
            follower_id TEXT NOT NULL,
            followee_id TEXT NOT NULL,
            PRIMARY KEY(follower_id, followee_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS friendships(
            user_id TEXT NOT NULL,
            friend_id TEXT NOT NULL,
            PRIMARY KEY(user_id, friend_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT,
            language TEXT,
            questions TEXT NOT NULL DEFAULT '[]',
            visible INTEGER NOT NULL DEFAULT 1,
            blocked INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            creator_id TEXT,
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_category ON quizzes(category)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_deleted ON quizzes(deleted_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS game_sessions(
            id TEXT PRIMARY KEY,
            game_pin TEXT NOT NULL,
            host_id TEXT,
            quiz_id TEXT,
            status TEXT NOT NULL DEFAULT 'waiting',
            participants TEXT NOT NULL DEFAULT '[]',
            started_at TEXT,
            ended_at TEXT,
            total_time_minutes INTEGER,
            application TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_game_sessions_status ON game_sessions(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_game_sessions_host ON game_sessions(host_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_game_sessions_quiz ON game_sessions(quiz_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            avatar_path TEXT,
            cover_path TEXT,
            creator_id TEXT,
            members TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'public',
            location TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_deleted ON groups(deleted_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reports(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            report_type TEXT,
            content_type TEXT,
            reporter_id TEXT,
            reported_user_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            admin_notes TEXT,
            messages TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status)",
        [],
    )?;

    // Existing workspaces may predate the compare-and-swap version columns,
    // the blocked_at audit stamp, or the explicit duration override. Add and
    // default them if needed.
    ensure_version_column(&conn, "quizzes")?;
    ensure_version_column(&conn, "groups")?;
    ensure_version_column(&conn, "reports")?;
    ensure_profiles_blocked_at(&conn)?;
    ensure_sessions_total_time(&conn)?;

    Ok(conn)
}

fn ensure_version_column(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "version")? {
        return Ok(());
    }
    conn.execute(
        &format!(
            "ALTER TABLE {} ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
            table
        ),
        [],
    )?;
    Ok(())
}

fn ensure_profiles_blocked_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "profiles", "blocked_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE profiles ADD COLUMN blocked_at TEXT", [])?;
    Ok(())
}

fn ensure_sessions_total_time(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "game_sessions", "total_time_minutes")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE game_sessions ADD COLUMN total_time_minutes INTEGER",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
