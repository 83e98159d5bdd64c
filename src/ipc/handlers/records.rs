use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{kind_param, open_store, row_selections};
use crate::ipc::types::{AppState, Request};
use crate::records;
use serde_json::json;
use tracing::info;

fn handle_records_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "run linkage.run first", None);
    };
    let sheets: Vec<records::Checklist> = session.runs.iter().map(records::checklist).collect();
    ok(
        &req.id,
        json!({
            "runId": session.id.to_string(),
            "sheets": sheets,
        }),
    )
}

fn handle_records_render(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "run linkage.run first", None);
    };
    let kind = match kind_param(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let Some(row) = req.params.get("row").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing row", None);
    };
    let Some(run) = session.run(kind) else {
        return err(&req.id, "not_found", "sheet not part of this session", None);
    };
    let Some(record) = u32::try_from(row).ok().and_then(|r| run.record(r)) else {
        return err(
            &req.id,
            "not_found",
            format!("row {row} is not in the current session"),
            Some(json!({ "kind": kind, "row": row })),
        );
    };

    let fields: Vec<serde_json::Value> = records::rendered_fields(record, &run.config.columns)
        .into_iter()
        .map(|(placeholder, value)| json!({ "placeholder": placeholder, "value": value }))
        .collect();
    ok(
        &req.id,
        json!({
            "kind": kind,
            "row": record.row_number,
            "fields": fields,
            "names": records::output_names(record),
        }),
    )
}

fn handle_records_mark_generated(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "run linkage.run first", None);
    };
    let selections = match row_selections(req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut sheets = Vec::new();
    for (kind, rows) in selections {
        let Some(run) = session.run_mut(kind) else {
            return err(&req.id, "not_found", "sheet not part of this session", None);
        };
        let mut store = match open_store(req, conn, kind) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        let outcome = records::mark_generated(&mut store, run, &rows);
        sheets.push(json!({
            "kind": kind,
            "marked": outcome.marked,
            "rejected": outcome.rejected,
            "write": outcome.write.to_json(),
        }));
    }
    ok(&req.id, json!({ "sheets": sheets }))
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if req.params.get("confirm").and_then(|v| v.as_bool()) != Some(true) {
        return err(
            &req.id,
            "confirmation_required",
            "deleting rows is irreversible; pass confirm: true",
            None,
        );
    }
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "run linkage.run first", None);
    };
    let selections = match row_selections(req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut sheets = Vec::new();
    for (kind, rows) in selections {
        let Some(run) = session.run(kind) else {
            return err(&req.id, "not_found", "sheet not part of this session", None);
        };
        let mut store = match open_store(req, conn, kind) {
            Ok(s) => s,
            Err(resp) => return resp,
        };
        let outcome = records::delete_records(&mut store, run, &rows);
        let mut entry = json!({
            "kind": kind,
            "deleted": outcome.deleted,
            "rejected": outcome.rejected,
        });
        if let Some(e) = outcome.error {
            entry["error"] = json!({ "code": e.code(), "message": e.to_string() });
        }
        sheets.push(entry);
    }

    // Row numbers after a deletion no longer match the projection.
    state.session = None;
    info!("session invalidated after row deletion");
    ok(&req.id, json!({ "sheets": sheets, "sessionInvalidated": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.pending" => Some(handle_records_pending(state, req)),
        "records.render" => Some(handle_records_render(state, req)),
        "records.markGenerated" => Some(handle_records_mark_generated(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        _ => None,
    }
}
