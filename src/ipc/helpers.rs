use crate::config::RegistrantKind;
use crate::ipc::error::err;
use crate::ipc::types::Request;
use crate::sheet::SqliteSheet;
use rusqlite::Connection;
use serde_json::json;

pub fn kind_param(req: &Request) -> Result<RegistrantKind, serde_json::Value> {
    match optional_kind_param(req)? {
        Some(kind) => Ok(kind),
        None => Err(err(&req.id, "bad_params", "missing kind", None)),
    }
}

pub fn optional_kind_param(req: &Request) -> Result<Option<RegistrantKind>, serde_json::Value> {
    let Some(raw) = req.params.get("kind") else {
        return Ok(None);
    };
    let Some(s) = raw.as_str() else {
        return Err(err(&req.id, "bad_params", "kind must be a string", None));
    };
    match RegistrantKind::parse(s) {
        Some(kind) => Ok(Some(kind)),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("unknown kind: {s}"),
            Some(json!({ "expected": ["PF", "PJ"] })),
        )),
    }
}

/// `params.rows = [{kind, row}, ...]` grouped per kind, PF first, request
/// order kept within a kind.
pub fn row_selections(
    req: &Request,
) -> Result<Vec<(RegistrantKind, Vec<i64>)>, serde_json::Value> {
    let Some(items) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing rows", None));
    };
    let mut grouped: Vec<(RegistrantKind, Vec<i64>)> =
        RegistrantKind::ALL.iter().map(|k| (*k, Vec::new())).collect();
    for (i, item) in items.iter().enumerate() {
        let kind = item
            .get("kind")
            .and_then(|v| v.as_str())
            .and_then(RegistrantKind::parse);
        let row = item.get("row").and_then(|v| v.as_i64());
        let (Some(kind), Some(row)) = (kind, row) else {
            return Err(err(
                &req.id,
                "bad_params",
                "each row needs kind (PF|PJ) and an integer row",
                Some(json!({ "index": i })),
            ));
        };
        if let Some((_, rows)) = grouped.iter_mut().find(|(k, _)| *k == kind) {
            rows.push(row);
        }
    }
    grouped.retain(|(_, rows)| !rows.is_empty());
    Ok(grouped)
}

pub fn open_store<'a>(
    req: &Request,
    conn: &'a Connection,
    kind: RegistrantKind,
) -> Result<SqliteSheet<'a>, serde_json::Value> {
    match SqliteSheet::open(conn, kind) {
        Ok(Some(store)) => Ok(store),
        Ok(None) => Err(err(
            &req.id,
            "sheet_not_found",
            format!("no {} sheet imported in this workspace", kind.as_str()),
            Some(json!({ "kind": kind })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", format!("{e:?}"), None)),
    }
}
