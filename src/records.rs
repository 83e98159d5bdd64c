use crate::config::{LinkageColumns, RegistrantKind, GENERATED_MARKER};
use crate::identifiers::{format_cnpj, format_cpf};
use crate::pipeline::{MergedRecord, SheetRun};
use crate::row::Row;
use crate::sheet::{
    BatchUpdate, CellAddress, RemoteError, SheetStore, ValueInputOption, ValueRange,
};
use crate::writer::{self, WriteOutcome};
use serde::Serialize;
use tracing::{info, warn};

const LABEL_NAME_MAX: usize = 35;
const FOLDER_NAME_MAX: usize = 80;
const FORBIDDEN_PATH_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

fn first_non_empty<'a>(row: &'a Row, columns: &[&str]) -> Option<&'a str> {
    columns
        .iter()
        .filter_map(|c| row.get_ci(c))
        .find(|v| !v.trim().is_empty())
        .map(str::trim)
}

fn display_name(row: &Row) -> Option<&str> {
    first_non_empty(row, &["NOME COMPLETO", "RAZÃO SOCIAL"])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub kind: RegistrantKind,
    pub row: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub kind: RegistrantKind,
    pub items: Vec<ChecklistItem>,
    pub generated: usize,
    pub total: usize,
}

pub fn label(row: &Row) -> String {
    let name = display_name(row).unwrap_or("N/A");
    let plate = first_non_empty(row, &["PLACA"]).unwrap_or("N/A");
    let name = if name.chars().count() > LABEL_NAME_MAX {
        format!("{}...", name.chars().take(LABEL_NAME_MAX).collect::<String>())
    } else {
        name.to_string()
    };
    format!("{name} - {plate}")
}

/// Records still awaiting document generation.
pub fn checklist(run: &SheetRun) -> Checklist {
    let status = &run.config.columns.generation_status;
    let mut items = Vec::new();
    let mut generated = 0;
    for rec in &run.records {
        if rec.is_generated(status) {
            generated += 1;
            continue;
        }
        items.push(ChecklistItem {
            kind: rec.kind,
            row: rec.row_number,
            label: label(&rec.row),
        });
    }
    Checklist {
        kind: run.kind,
        items,
        generated,
        total: run.records.len(),
    }
}

type Formatter = fn(&str) -> String;

fn identifier_formatter(kind: RegistrantKind) -> Formatter {
    match kind {
        RegistrantKind::Pf => format_cpf,
        RegistrantKind::Pj => format_cnpj,
    }
}

/// Uppercased identifier column -> formatter. Covers the configured columns
/// of the record's own sheet plus both kinds' default columns, so a CPF
/// column on a PJ sheet still renders as a CPF.
fn identifier_columns(kind: RegistrantKind, cols: &LinkageColumns) -> Vec<(String, Formatter)> {
    let mut out: Vec<(String, Formatter)> = Vec::new();
    let mut add = |name: &str, f: Formatter| {
        let key = name.trim().to_uppercase();
        if !out.iter().any(|(k, _)| *k == key) {
            out.push((key, f));
        }
    };
    add(&cols.trigger_id, identifier_formatter(kind));
    add(&cols.comparison_id, identifier_formatter(kind));
    for other in RegistrantKind::ALL {
        let defaults = LinkageColumns::defaults(other);
        add(&defaults.trigger_id, identifier_formatter(other));
        add(&defaults.comparison_id, identifier_formatter(other));
    }
    out
}

/// `{COLUMN}` -> display value, in row order.
pub fn rendered_fields(record: &MergedRecord, cols: &LinkageColumns) -> Vec<(String, String)> {
    let id_columns = identifier_columns(record.kind, cols);
    record
        .row
        .iter()
        .map(|(key, value)| {
            let key = key.trim().to_uppercase();
            let value = value.trim();
            let formatter = id_columns.iter().find(|(k, _)| *k == key).map(|(_, f)| f);
            let rendered = if let Some(format_id) = formatter {
                format_id(value)
            } else if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
                value.to_string()
            } else {
                value.to_uppercase()
            };
            (format!("{{{key}}}"), rendered)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputNames {
    pub folder: String,
    pub plate: String,
}

fn strip_forbidden(s: &str) -> String {
    s.chars().filter(|c| !FORBIDDEN_PATH_CHARS.contains(c)).collect()
}

pub fn output_names(record: &MergedRecord) -> OutputNames {
    let name = display_name(&record.row)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Registro_L{}", record.row_number));
    let folder: String = strip_forbidden(&name)
        .replace(' ', "_")
        .chars()
        .take(FOLDER_NAME_MAX)
        .collect();
    let plate = first_non_empty(&record.row, &["PLACA"]).unwrap_or("SemPlaca");
    OutputNames {
        folder,
        plate: strip_forbidden(plate).replace('-', ""),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRejection {
    pub row: i64,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct MarkOutcome {
    pub write: WriteOutcome,
    pub marked: Vec<u32>,
    pub rejected: Vec<RowRejection>,
}

fn accept_rows(run: &SheetRun, rows: &[i64]) -> (Vec<u32>, Vec<RowRejection>) {
    let mut accepted: Vec<u32> = Vec::new();
    let mut rejected = Vec::new();
    for &row in rows {
        if row < 2 {
            rejected.push(RowRejection {
                row,
                code: "bad_row",
                message: format!("row {row} is not a data row"),
            });
            continue;
        }
        let Some(found) = u32::try_from(row).ok().filter(|r| run.record(*r).is_some()) else {
            rejected.push(RowRejection {
                row,
                code: "not_found",
                message: format!("row {row} is not in the current session"),
            });
            continue;
        };
        if !accepted.contains(&found) {
            accepted.push(found);
        }
    }
    (accepted, rejected)
}

/// Writes the generated marker for `rows` in one batch. On success the
/// session projection is updated too.
pub fn mark_generated(store: &mut dyn SheetStore, run: &mut SheetRun, rows: &[i64]) -> MarkOutcome {
    let (accepted, rejected) = accept_rows(run, rows);
    for r in &rejected {
        warn!(sheet = %run.title, row = r.row, "{}", r.message);
    }

    let status = run.config.columns.generation_status.clone();
    let Some(status_col) = run.header.index_of(&status) else {
        return MarkOutcome {
            write: WriteOutcome::Failed {
                cells: accepted.len(),
                error: RemoteError::Store(format!("column `{status}` missing from header")),
            },
            marked: Vec::new(),
            rejected,
        };
    };

    let batch = BatchUpdate {
        value_input_option: ValueInputOption::UserEntered,
        data: accepted
            .iter()
            .map(|&row| {
                ValueRange::single(CellAddress::new(row, status_col), GENERATED_MARKER.to_string())
            })
            .collect(),
    };
    let write = writer::send(store, &batch);

    let marked = if matches!(write, WriteOutcome::Sent { .. }) {
        for &row in &accepted {
            if let Some(rec) = run.record_mut(row) {
                rec.row.set(&status, GENERATED_MARKER);
            }
        }
        info!(sheet = %run.title, rows = accepted.len(), "status marked");
        accepted
    } else {
        Vec::new()
    };

    MarkOutcome {
        write,
        marked,
        rejected,
    }
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub rejected: Vec<RowRejection>,
    pub error: Option<RemoteError>,
}

/// Deletes rows bottom-up in a single call.
pub fn delete_records(store: &mut dyn SheetStore, run: &SheetRun, rows: &[i64]) -> DeleteOutcome {
    let (mut accepted, rejected) = accept_rows(run, rows);
    accepted.sort_unstable_by(|a, b| b.cmp(a));
    if accepted.is_empty() {
        return DeleteOutcome {
            deleted: 0,
            rejected,
            error: None,
        };
    }
    match store.delete_rows(&accepted) {
        Ok(()) => {
            info!(sheet = %run.title, rows = accepted.len(), "rows deleted");
            DeleteOutcome {
                deleted: accepted.len(),
                rejected,
                error: None,
            }
        }
        Err(e) => {
            warn!(sheet = %run.title, error = %e, "row deletion failed");
            DeleteOutcome {
                deleted: 0,
                rejected,
                error: Some(e),
            }
        }
    }
}
