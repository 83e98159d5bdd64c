use super::{stored_text, BatchUpdate, RemoteError, SheetStore};
use crate::config::RegistrantKind;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

/// Workspace mirror of one form-response sheet, stored cell by cell.
pub struct SqliteSheet<'a> {
    conn: &'a Connection,
    sheet_id: String,
    title: String,
}

impl<'a> SqliteSheet<'a> {
    pub fn open(conn: &'a Connection, kind: RegistrantKind) -> anyhow::Result<Option<Self>> {
        let found: Option<(String, String)> = conn
            .query_row(
                "SELECT id, title FROM sheets WHERE kind = ?",
                [kind.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .context("failed to look up sheet")?;
        Ok(found.map(|(sheet_id, title)| Self {
            conn,
            sheet_id,
            title,
        }))
    }

    /// Replaces the sheet for `kind` with a header row and data rows.
    pub fn replace_contents(
        conn: &'a Connection,
        kind: RegistrantKind,
        title: &str,
        header: &[String],
        rows: &[Vec<Value>],
    ) -> anyhow::Result<Self> {
        let tx = conn
            .unchecked_transaction()
            .context("failed to begin import transaction")?;

        let existing: Option<String> = tx
            .query_row("SELECT id FROM sheets WHERE kind = ?", [kind.as_str()], |r| {
                r.get(0)
            })
            .optional()?;
        let sheet_id = match existing {
            Some(id) => {
                tx.execute("DELETE FROM sheet_cells WHERE sheet_id = ?", [&id])?;
                tx.execute(
                    "UPDATE sheets SET title = ?, imported_at = ? WHERE id = ?",
                    (title, chrono::Utc::now().to_rfc3339(), &id),
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO sheets(id, kind, title, imported_at) VALUES(?, ?, ?, ?)",
                    (&id, kind.as_str(), title, chrono::Utc::now().to_rfc3339()),
                )?;
                id
            }
        };

        {
            let mut insert = tx.prepare(
                "INSERT INTO sheet_cells(sheet_id, row, col, value) VALUES(?, ?, ?, ?)",
            )?;
            for (c, name) in header.iter().enumerate() {
                if !name.is_empty() {
                    insert.execute((&sheet_id, 1_i64, (c + 1) as i64, name))?;
                }
            }
            for (r, cells) in rows.iter().enumerate() {
                let row_no = (r + 2) as i64;
                let mut wrote_any = false;
                for (c, cell) in cells.iter().enumerate() {
                    let text = match cell {
                        Value::Null => continue,
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    insert.execute((&sheet_id, row_no, (c + 1) as i64, &text))?;
                    wrote_any = true;
                }
                // Keep blank rows addressable so row numbers stay stable.
                if !wrote_any {
                    insert.execute((&sheet_id, row_no, 1_i64, ""))?;
                }
            }
        }
        tx.commit().context("failed to commit sheet import")?;

        Ok(Self {
            conn,
            sheet_id,
            title: title.to_string(),
        })
    }

    fn last_row(&self) -> Result<u32, RemoteError> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(row) FROM sheet_cells WHERE sheet_id = ?",
            [&self.sheet_id],
            |r| r.get(0),
        )?;
        Ok(max.unwrap_or(0).max(0) as u32)
    }
}

impl SheetStore for SqliteSheet<'_> {
    fn title(&self) -> &str {
        &self.title
    }

    fn header_row(&self) -> Result<Vec<String>, RemoteError> {
        let mut stmt = self.conn.prepare(
            "SELECT col, value FROM sheet_cells WHERE sheet_id = ? AND row = 1 ORDER BY col",
        )?;
        let cells = stmt
            .query_map([&self.sheet_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let width = cells.last().map(|(c, _)| *c as usize).unwrap_or(0);
        let mut out = vec![String::new(); width];
        for (c, v) in cells {
            out[(c - 1) as usize] = v;
        }
        Ok(out)
    }

    fn data_rows(&self) -> Result<Vec<Vec<Value>>, RemoteError> {
        let last = self.last_row()?;
        if last < 2 {
            return Ok(Vec::new());
        }
        let mut rows: Vec<Vec<Value>> = vec![Vec::new(); (last - 1) as usize];
        let mut stmt = self.conn.prepare(
            "SELECT row, col, value FROM sheet_cells
             WHERE sheet_id = ? AND row >= 2
             ORDER BY row, col",
        )?;
        let cells = stmt.query_map([&self.sheet_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?;
        for cell in cells {
            let (row, col, value) = cell?;
            let slot = &mut rows[(row - 2) as usize];
            let idx = (col - 1) as usize;
            if slot.len() <= idx {
                slot.resize(idx + 1, Value::Null);
            }
            slot[idx] = Value::String(value);
        }
        Ok(rows)
    }

    fn batch_update(&mut self, update: &BatchUpdate) -> Result<(), RemoteError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO sheet_cells(sheet_id, row, col, value) VALUES(?, ?, ?, ?)
                 ON CONFLICT(sheet_id, row, col) DO UPDATE SET value = excluded.value",
            )?;
            for vr in &update.data {
                let text = stored_text(vr.value(), update.value_input_option);
                upsert.execute((
                    &self.sheet_id,
                    vr.range.row as i64,
                    vr.range.col as i64,
                    &text,
                ))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_rows(&mut self, rows: &[u32]) -> Result<(), RemoteError> {
        let mut sorted = rows.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let tx = self.conn.unchecked_transaction()?;
        for row in sorted {
            tx.execute(
                "DELETE FROM sheet_cells WHERE sheet_id = ? AND row = ?",
                (&self.sheet_id, row as i64),
            )?;
            // Two-step shift keeps (sheet_id, row, col) unique mid-update.
            tx.execute(
                "UPDATE sheet_cells SET row = -(row - 1) WHERE sheet_id = ? AND row > ?",
                (&self.sheet_id, row as i64),
            )?;
            tx.execute(
                "UPDATE sheet_cells SET row = -row WHERE sheet_id = ? AND row < 0",
                [&self.sheet_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
