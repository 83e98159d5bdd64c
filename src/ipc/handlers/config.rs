use crate::config::{self, RegistrantKind};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{kind_param, optional_kind_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kinds = match optional_kind_param(req) {
        Ok(Some(kind)) => vec![kind],
        Ok(None) => RegistrantKind::ALL.to_vec(),
        Err(resp) => return resp,
    };

    let mut configs = Vec::new();
    for kind in kinds {
        match config::load(conn, kind) {
            Ok(cfg) => configs.push(cfg),
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        }
    }
    ok(&req.id, json!({ "configs": configs }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind = match kind_param(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let current = match config::load(conn, kind) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let updated = match config::apply_patch(&current, patch) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", format!("{e:#}"), None),
    };
    if let Err(e) = config::save(conn, &updated) {
        return err(&req.id, "db_update_failed", format!("{e:?}"), None);
    }
    ok(&req.id, json!({ "config": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        _ => None,
    }
}
