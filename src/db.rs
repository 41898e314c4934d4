use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("classkit.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create or upgrade the workspace schema. Safe to run on every open.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL UNIQUE,
            members_text TEXT NOT NULL,
            size INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_owner ON groups(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            positive_data TEXT NOT NULL DEFAULT '{}',
            negative_data TEXT NOT NULL DEFAULT '{}',
            positive_total INTEGER NOT NULL DEFAULT 0,
            negative_total INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_members_group ON members(group_id)",
        [],
    )?;

    // Workspaces from before member ordering was stored need the column
    // added and backfilled from insert order.
    ensure_members_sort_order(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_members_group_sort ON members(group_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS field_definitions(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            value_type TEXT NOT NULL,
            sign TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES groups(id),
            UNIQUE(group_id, name, sign)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_field_definitions_group ON field_definitions(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_stats(
            owner_id TEXT PRIMARY KEY,
            calculator_uses INTEGER NOT NULL DEFAULT 0,
            wheel_spins INTEGER NOT NULL DEFAULT 0,
            divider_uses INTEGER NOT NULL DEFAULT 0,
            stopwatch_starts INTEGER NOT NULL DEFAULT 0,
            stopwatch_flags INTEGER NOT NULL DEFAULT 0,
            stopwatch_total_ms INTEGER NOT NULL DEFAULT 0,
            countdown_starts INTEGER NOT NULL DEFAULT 0,
            countdown_total_ms INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS wheel_picks(
            group_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            picked_names TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(group_id, owner_id),
            FOREIGN KEY(group_id) REFERENCES groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wheel_picks_owner ON wheel_picks(owner_id)",
        [],
    )?;

    Ok(())
}

fn ensure_members_sort_order(conn: &Connection) -> anyhow::Result<()> {
    // If the column already exists, we're done.
    if table_has_column(conn, "members", "sort_order")? {
        return Ok(());
    }

    conn.execute(
        "ALTER TABLE members ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill per group using existing insert order as a best-effort.
    let mut group_stmt = conn.prepare("SELECT id FROM groups ORDER BY rowid")?;
    let group_ids = group_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut member_stmt =
        conn.prepare("SELECT id FROM members WHERE group_id = ? ORDER BY rowid")?;

    for gid in group_ids {
        let member_ids = member_stmt
            .query_map([&gid], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for (i, mid) in member_ids.iter().enumerate() {
            conn.execute(
                "UPDATE members SET sort_order = ? WHERE id = ?",
                (i as i64, mid),
            )?;
        }
    }

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
