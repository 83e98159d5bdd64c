use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{kind_param, open_store};
use crate::ipc::types::{AppState, Request};
use crate::row::cell_text;
use crate::sheet::{SheetStore, SqliteSheet};
use serde_json::json;
use tracing::info;

fn handle_sheets_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match kind_param(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let Some(header) = req.params.get("header").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing header", None);
    };
    let header: Vec<String> = header.iter().map(cell_text).collect();
    let rows: Vec<Vec<serde_json::Value>> = match req.params.get("rows") {
        None => Vec::new(),
        Some(v) => match v.as_array() {
            Some(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for (i, r) in rows.iter().enumerate() {
                    let Some(cells) = r.as_array() else {
                        return err(
                            &req.id,
                            "bad_params",
                            "rows must be arrays of cells",
                            Some(json!({ "index": i })),
                        );
                    };
                    out.push(cells.clone());
                }
                out
            }
            None => return err(&req.id, "bad_params", "rows must be an array", None),
        },
    };

    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => match config::load(conn, kind) {
            Ok(cfg) => cfg.tab,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        },
    };

    if let Err(e) = SqliteSheet::replace_contents(conn, kind, &title, &header, &rows) {
        return err(
            &req.id,
            "db_insert_failed",
            format!("{e:?}"),
            Some(json!({ "table": "sheet_cells" })),
        );
    }
    info!(sheet = %title, kind = kind.as_str(), rows = rows.len(), "sheet imported");
    state.session = None;
    ok(
        &req.id,
        json!({ "kind": kind, "title": title, "rows": rows.len() }),
    )
}

fn handle_sheets_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match kind_param(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let store = match open_store(req, conn, kind) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let header = match store.header_row() {
        Ok(h) => h,
        Err(e) => return err(&req.id, "remote_failed", e.to_string(), None),
    };
    let rows = match store.data_rows() {
        Ok(r) => r,
        Err(e) => return err(&req.id, "remote_failed", e.to_string(), None),
    };
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|cells| cells.iter().map(cell_text).collect())
        .collect();
    ok(
        &req.id,
        json!({
            "kind": kind,
            "title": store.title(),
            "header": header,
            "rows": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheets.import" => Some(handle_sheets_import(state, req)),
        "sheets.get" => Some(handle_sheets_get(state, req)),
        _ => None,
    }
}
