use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "autodocs.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheets(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            imported_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheet_cells(
            sheet_id TEXT NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY(sheet_id, row, col),
            FOREIGN KEY(sheet_id) REFERENCES sheets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sheet_cells_row ON sheet_cells(sheet_id, row)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS linkage_runs(
            id TEXT NOT NULL,
            kind TEXT NOT NULL,
            started_at TEXT NOT NULL,
            row_count INTEGER NOT NULL,
            source_count INTEGER NOT NULL,
            target_count INTEGER NOT NULL,
            write_count INTEGER NOT NULL,
            write_status TEXT NOT NULL,
            config_error TEXT,
            write_error TEXT,
            PRIMARY KEY(id, kind)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_linkage_runs_started ON linkage_runs(started_at)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("malformed setting {key}"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, &raw),
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RunJournalEntry<'a> {
    pub run_id: &'a str,
    pub kind: &'a str,
    pub started_at: &'a str,
    pub row_count: usize,
    pub source_count: usize,
    pub target_count: usize,
    pub write_count: usize,
    pub write_status: &'a str,
    pub config_error: Option<String>,
    pub write_error: Option<String>,
}

pub fn record_run(conn: &Connection, entry: &RunJournalEntry<'_>) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO linkage_runs(
            id, kind, started_at, row_count, source_count, target_count,
            write_count, write_status, config_error, write_error)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            entry.run_id,
            entry.kind,
            entry.started_at,
            entry.row_count as i64,
            entry.source_count as i64,
            entry.target_count as i64,
            entry.write_count as i64,
            entry.write_status,
            &entry.config_error,
            &entry.write_error,
        ),
    )
    .context("failed to journal linkage run")?;
    Ok(())
}

pub fn list_runs(conn: &Connection, limit: i64) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, started_at, row_count, source_count, target_count,
                write_count, write_status, config_error, write_error
         FROM linkage_runs
         ORDER BY started_at DESC, kind
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(serde_json::json!({
                "runId": row.get::<_, String>(0)?,
                "kind": row.get::<_, String>(1)?,
                "startedAt": row.get::<_, String>(2)?,
                "rows": row.get::<_, i64>(3)?,
                "sources": row.get::<_, i64>(4)?,
                "targets": row.get::<_, i64>(5)?,
                "writes": row.get::<_, i64>(6)?,
                "writeStatus": row.get::<_, String>(7)?,
                "configError": row.get::<_, Option<String>>(8)?,
                "writeError": row.get::<_, Option<String>>(9)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
