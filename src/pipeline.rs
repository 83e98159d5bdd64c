use crate::config::{RegistrantKind, SheetConfig, GENERATED_MARKER};
use crate::linkage::{self, Linkage, LinkageError, LinkageStats, LinkageWarning};
use crate::row::{normalize_records, Header, Row};
use crate::sheet::{load_sheet, LoadError, SheetStore};
use crate::writer::{self, WriteOutcome};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

/// A row as seen by the checklist and document generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub kind: RegistrantKind,
    pub row_number: u32,
    pub row: Row,
}

impl MergedRecord {
    pub fn is_generated(&self, status_column: &str) -> bool {
        self.row.get(status_column).trim().to_uppercase() == GENERATED_MARKER
    }
}

#[derive(Debug, Clone)]
pub enum LinkageStatus {
    Linked(LinkageStats),
    ConfigError(LinkageError),
}

/// Outcome of one sheet's load -> link -> flush pass. The merged records
/// reflect in-memory fills even when the remote write failed.
#[derive(Debug, Clone)]
pub struct SheetRun {
    pub kind: RegistrantKind,
    pub title: String,
    pub config: SheetConfig,
    pub header: Header,
    pub records: Vec<MergedRecord>,
    pub linkage: LinkageStatus,
    pub warnings: Vec<LinkageWarning>,
    pub write: WriteOutcome,
}

impl SheetRun {
    pub fn merged_ok(&self) -> bool {
        matches!(self.linkage, LinkageStatus::Linked(_))
    }

    pub fn remote_ok(&self) -> bool {
        self.write.is_ok()
    }

    pub fn stats(&self) -> LinkageStats {
        match &self.linkage {
            LinkageStatus::Linked(s) => *s,
            LinkageStatus::ConfigError(_) => LinkageStats {
                rows: self.records.len(),
                ..LinkageStats::default()
            },
        }
    }

    pub fn config_error(&self) -> Option<String> {
        match &self.linkage {
            LinkageStatus::ConfigError(e) => Some(e.to_string()),
            LinkageStatus::Linked(_) => None,
        }
    }

    pub fn record(&self, row_number: u32) -> Option<&MergedRecord> {
        self.records.iter().find(|r| r.row_number == row_number)
    }

    pub fn record_mut(&mut self, row_number: u32) -> Option<&mut MergedRecord> {
        self.records.iter_mut().find(|r| r.row_number == row_number)
    }

    pub fn summary_json(&self) -> serde_json::Value {
        let stats = self.stats();
        json!({
            "kind": self.kind,
            "title": self.title,
            "rows": stats.rows,
            "sources": stats.sources,
            "targets": stats.targets,
            "filledRows": stats.filled_rows,
            "unmatched": stats.unmatched,
            "warnings": self.warnings,
            "configError": self.config_error(),
            "mergedOk": self.merged_ok(),
            "remoteOk": self.remote_ok(),
            "write": self.write.to_json(),
        })
    }
}

fn tag(kind: RegistrantKind, rows: Vec<Row>) -> Vec<MergedRecord> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| MergedRecord {
            kind,
            row_number: (i + 2) as u32,
            row,
        })
        .collect()
}

/// A sheet read, normalized and linked in memory. Nothing has been sent.
#[derive(Debug, Clone)]
pub struct PreparedSheet {
    pub title: String,
    pub header: Header,
    pub rows: Vec<Row>,
    pub linked: Result<Linkage, LinkageError>,
}

/// Reads and links without touching the store. Header problems and read
/// failures are returned; a linkage configuration error is not.
pub fn prepare(store: &dyn SheetStore, config: &SheetConfig) -> Result<PreparedSheet, LoadError> {
    let loaded = load_sheet(store, &config.columns.generation_status)?;
    let mut rows = normalize_records(&loaded.records);
    if rows.is_empty() {
        info!(sheet = %loaded.title, "sheet has no data rows");
    }
    let linked = linkage::link(&loaded.header, &mut rows, &config.columns);
    Ok(PreparedSheet {
        title: loaded.title,
        header: loaded.header,
        rows,
        linked,
    })
}

/// Flushes a prepared sheet's write-set and builds its run record.
pub fn finish(
    store: &mut dyn SheetStore,
    config: &SheetConfig,
    prepared: PreparedSheet,
) -> SheetRun {
    let PreparedSheet {
        title,
        header,
        rows,
        linked,
    } = prepared;
    info!(sheet = %title, kind = config.kind.as_str(), "pre-fill started");

    let (linkage_status, warnings, write) = match linked {
        Ok(Linkage {
            writes,
            warnings,
            stats,
        }) => {
            let write = writer::flush(store, &writes);
            (LinkageStatus::Linked(stats), warnings, write)
        }
        Err(e) => {
            error!(sheet = %title, error = %e, "pre-fill skipped: configuration error");
            (LinkageStatus::ConfigError(e), Vec::new(), WriteOutcome::NothingToSend)
        }
    };
    info!(sheet = %title, status = write.status(), "pre-fill finished");

    SheetRun {
        kind: config.kind,
        title,
        config: config.clone(),
        header,
        records: tag(config.kind, rows),
        linkage: linkage_status,
        warnings,
        write,
    }
}

#[cfg(test)]
pub fn run_sheet(store: &mut dyn SheetStore, config: &SheetConfig) -> Result<SheetRun, LoadError> {
    let prepared = prepare(&*store, config)?;
    Ok(finish(store, config, prepared))
}

/// Per-run context handed to the checklist and generation handlers in place
/// of process-wide state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub runs: Vec<SheetRun>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            runs: Vec::new(),
        }
    }

    pub fn run(&self, kind: RegistrantKind) -> Option<&SheetRun> {
        self.runs.iter().find(|r| r.kind == kind)
    }

    pub fn run_mut(&mut self, kind: RegistrantKind) -> Option<&mut SheetRun> {
        self.runs.iter_mut().find(|r| r.kind == kind)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
