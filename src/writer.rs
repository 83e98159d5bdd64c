use crate::linkage::WriteSet;
use crate::sheet::{
    user_entered_text, BatchUpdate, CellAddress, RemoteError, SheetStore, ValueInputOption,
    ValueRange,
};
use serde_json::json;
use tracing::{error, info};

/// Result of flushing one sheet's write-set. Independent of whether the
/// in-memory merge succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    NothingToSend,
    Sent { cells: usize },
    Failed { cells: usize, error: RemoteError },
}

impl WriteOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::NothingToSend => "nothing_to_send",
            Self::Sent { .. } => "sent",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn cells(&self) -> usize {
        match self {
            Self::NothingToSend => 0,
            Self::Sent { cells } | Self::Failed { cells, .. } => *cells,
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut v = json!({
            "status": self.status(),
            "cells": self.cells(),
        });
        if let Some(e) = self.error() {
            v["error"] = json!({ "code": e.code(), "message": e.to_string() });
        }
        v
    }
}

pub fn build_batch(writes: &WriteSet) -> BatchUpdate {
    BatchUpdate {
        value_input_option: ValueInputOption::UserEntered,
        data: writes
            .iter()
            .map(|w| {
                ValueRange::single(CellAddress::new(w.row, w.col), user_entered_text(&w.value))
            })
            .collect(),
    }
}

/// Sends every staged cell in exactly one request. An empty write-set makes
/// no call. Failures are reported, never retried.
pub fn flush(store: &mut dyn SheetStore, writes: &WriteSet) -> WriteOutcome {
    if writes.is_empty() {
        info!(sheet = %store.title(), "no updates to send");
        return WriteOutcome::NothingToSend;
    }
    let batch = build_batch(writes);
    send(store, &batch)
}

pub fn send(store: &mut dyn SheetStore, batch: &BatchUpdate) -> WriteOutcome {
    let cells = batch.len();
    if cells == 0 {
        return WriteOutcome::NothingToSend;
    }
    info!(sheet = %store.title(), cells, "sending batch update");
    match store.batch_update(batch) {
        Ok(()) => WriteOutcome::Sent { cells },
        Err(e) => {
            error!(sheet = %store.title(), cells, error = %e, "batch update failed");
            WriteOutcome::Failed { cells, error: e }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::memory::MemorySheet;

    #[test]
    fn empty_write_set_makes_no_call() {
        let mut store = MemorySheet::new("PF", vec![vec!["Status"]]);
        let out = flush(&mut store, &WriteSet::default());
        assert_eq!(out, WriteOutcome::NothingToSend);
        assert!(store.batches.is_empty());
    }

    #[test]
    fn all_cells_go_out_in_one_batch() {
        let mut store = MemorySheet::new("PF", vec![vec!["Status", "CPF", "NOME"], vec![]]);
        let mut ws = WriteSet::default();
        ws.stage(2, 2, "01234567890");
        ws.stage(2, 3, "ANA");

        let out = flush(&mut store, &ws);

        assert_eq!(out, WriteOutcome::Sent { cells: 2 });
        assert_eq!(store.batches.len(), 1);
        assert_eq!(store.batches[0].data[0].value(), "'01234567890");
        assert_eq!(store.cell(2, 2), "01234567890");
        assert_eq!(store.cell(2, 3), "ANA");
    }

    #[test]
    fn remote_failure_is_reported_whole() {
        let mut store = MemorySheet::new("PJ", vec![vec!["Status"]]);
        store.fail_next_write = Some(RemoteError::Quota("daily limit".to_string()));
        let mut ws = WriteSet::default();
        ws.stage(2, 1, "x");
        ws.stage(3, 1, "y");

        let out = flush(&mut store, &ws);

        assert_eq!(out.status(), "failed");
        assert_eq!(out.cells(), 2);
        assert!(!out.is_ok());
        assert_eq!(out.to_json()["error"]["code"], "quota");
        assert!(store.batches.is_empty());
    }
}
