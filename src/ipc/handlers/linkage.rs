use crate::config::{self, RegistrantKind};
use crate::db::{self, RunJournalEntry};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{open_store, optional_kind_param};
use crate::ipc::types::{AppState, Request};
use crate::pipeline::{self, Session, SheetRun};
use crate::sheet::{CellAddress, SheetStore};
use rusqlite::Connection;
use serde_json::json;
use tracing::{info, warn};

fn handle_linkage_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kinds = match optional_kind_param(req) {
        Ok(Some(kind)) => vec![kind],
        Ok(None) => RegistrantKind::ALL.to_vec(),
        Err(resp) => return resp,
    };

    let mut sheets = Vec::new();
    for kind in kinds {
        let cfg = match config::load(conn, kind) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        let store = match open_store(req, conn, kind) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        let prepared = match pipeline::prepare(&store, &cfg) {
            Ok(v) => v,
            Err(e) => {
                return err(&req.id, e.code(), e.to_string(), Some(json!({ "kind": kind })))
            }
        };
        let entry = match prepared.linked {
            Ok(linkage) => {
                let writes: Vec<serde_json::Value> = linkage
                    .writes
                    .iter()
                    .map(|w| {
                        json!({
                            "cell": CellAddress::new(w.row, w.col),
                            "value": w.value,
                        })
                    })
                    .collect();
                json!({
                    "kind": kind,
                    "title": store.title(),
                    "rows": linkage.stats.rows,
                    "sources": linkage.stats.sources,
                    "targets": linkage.stats.targets,
                    "filledRows": linkage.stats.filled_rows,
                    "unmatched": linkage.stats.unmatched,
                    "warnings": linkage.warnings,
                    "configError": null,
                    "writes": writes,
                })
            }
            Err(e) => json!({
                "kind": kind,
                "title": store.title(),
                "rows": prepared.rows.len(),
                "sources": 0,
                "targets": 0,
                "filledRows": 0,
                "unmatched": 0,
                "warnings": [],
                "configError": e.to_string(),
                "writes": [],
            }),
        };
        sheets.push(entry);
    }
    ok(&req.id, json!({ "sheets": sheets }))
}

fn journal(conn: &Connection, session: &Session, run: &SheetRun) {
    let stats = run.stats();
    let started_at = session.started_at.to_rfc3339();
    let run_id = session.id.to_string();
    let entry = RunJournalEntry {
        run_id: &run_id,
        kind: run.kind.as_str(),
        started_at: &started_at,
        row_count: stats.rows,
        source_count: stats.sources,
        target_count: stats.targets,
        write_count: run.write.cells(),
        write_status: run.write.status(),
        config_error: run.config_error(),
        write_error: run.write.error().map(|e| e.to_string()),
    };
    if let Err(e) = db::record_run(conn, &entry) {
        warn!(sheet = %run.title, error = %e, "run journal write failed");
    }
}

/// Reads and links PF and PJ before sending anything, so an unreadable or
/// invalid sheet fails the run with no writes to either. Then flushes PF and
/// PJ in turn and replaces the session.
fn handle_linkage_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut opened = Vec::new();
    for kind in RegistrantKind::ALL {
        let cfg = match config::load(conn, kind) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        let store = match open_store(req, conn, kind) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        opened.push((cfg, store));
    }

    let mut staged = Vec::with_capacity(opened.len());
    for (cfg, store) in opened {
        match pipeline::prepare(&store, &cfg) {
            Ok(prepared) => staged.push((cfg, store, prepared)),
            Err(e) => {
                warn!(kind = cfg.kind.as_str(), error = %e, "linkage run aborted before any write");
                return err(&req.id, e.code(), e.to_string(), Some(json!({ "kind": cfg.kind })));
            }
        }
    }

    let mut session = Session::new();
    info!(run = %session.id, "linkage run started");
    for (cfg, mut store, prepared) in staged {
        let run = pipeline::finish(&mut store, &cfg, prepared);
        journal(conn, &session, &run);
        session.runs.push(run);
    }

    let sheets: Vec<serde_json::Value> =
        session.runs.iter().map(SheetRun::summary_json).collect();
    let result = json!({
        "runId": session.id.to_string(),
        "startedAt": session.started_at.to_rfc3339(),
        "sheets": sheets,
    });
    state.session = Some(session);
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "linkage.preview" => Some(handle_linkage_preview(state, req)),
        "linkage.run" => Some(handle_linkage_run(state, req)),
        _ => None,
    }
}
