//! Record linkage between "source" registrations and the continuation rows
//! that extend them, plus back-fill of the continuation rows' empty fields.

use crate::config::LinkageColumns;
use crate::row::{Header, Row};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkageError {
    #[error("required column `{0}` not found in header")]
    MissingColumn(String),
}

/// A continuation row that names the registration it extends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub index: usize,
    pub identifier: String,
    pub row_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkageWarning {
    pub row_number: u32,
    pub message: String,
}

/// First-seen source row per comparison identifier.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    by_id: HashMap<String, Row>,
}

impl SourceMap {
    /// Registers `row` unless the identifier already has a source.
    pub fn offer(&mut self, identifier: &str, row: &Row) -> bool {
        if self.by_id.contains_key(identifier) {
            return false;
        }
        self.by_id.insert(identifier.to_string(), row.clone());
        true
    }

    pub fn get(&self, identifier: &str) -> Option<&Row> {
        self.by_id.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// One staged cell write, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    writes: Vec<StagedWrite>,
}

impl WriteSet {
    pub fn stage(&mut self, row: u32, col: u32, value: impl Into<String>) {
        self.writes.push(StagedWrite {
            row,
            col,
            value: value.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StagedWrite> {
        self.writes.iter()
    }

    #[cfg(test)]
    pub fn as_triples(&self) -> Vec<(u32, u32, &str)> {
        self.writes
            .iter()
            .map(|w| (w.row, w.col, w.value.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub sources: SourceMap,
    pub targets: Vec<Target>,
    pub warnings: Vec<LinkageWarning>,
}

/// Partitions rows, in order, into sources and continuation targets.
/// Rows matching neither condition are left alone.
pub fn classify(rows: &[Row], cols: &LinkageColumns) -> Classification {
    let mut out = Classification::default();
    for (i, row) in rows.iter().enumerate() {
        let row_number = (i + 2) as u32;
        let is_continuation = row.get(&cols.registration) == cols.continuation_value;
        let comparison = row.get(&cols.comparison_id);
        let trigger = row.get(&cols.trigger_id);

        if !is_continuation && !comparison.is_empty() {
            out.sources.offer(comparison, row);
        } else if is_continuation && !trigger.is_empty() {
            out.targets.push(Target {
                index: i,
                identifier: trigger.to_string(),
                row_number,
            });
        } else if is_continuation {
            let message = format!(
                "continuation row has no identifier in `{}`; not pre-filled",
                cols.trigger_id
            );
            warn!(row = row_number, "{message}");
            out.warnings.push(LinkageWarning {
                row_number,
                message,
            });
        }
    }
    out
}

/// Column positions resolved once per sheet. `fill` follows header order.
#[derive(Debug, Clone)]
struct ResolvedColumns {
    comparison_col: u32,
    fill: Vec<(String, u32)>,
}

fn resolve_columns(
    header: &Header,
    cols: &LinkageColumns,
) -> Result<ResolvedColumns, LinkageError> {
    for required in [&cols.registration, &cols.trigger_id, &cols.comparison_id] {
        if !header.contains(required) {
            return Err(LinkageError::MissingColumn(required.clone()));
        }
    }
    let comparison_col = header
        .index_of(&cols.comparison_id)
        .ok_or_else(|| LinkageError::MissingColumn(cols.comparison_id.clone()))?;
    let fill = header
        .columns()
        .iter()
        .filter(|(name, _)| !cols.is_control_column(name))
        .cloned()
        .collect();
    Ok(ResolvedColumns {
        comparison_col,
        fill,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkageStats {
    pub rows: usize,
    pub sources: usize,
    pub targets: usize,
    /// Targets that received at least one write.
    pub filled_rows: usize,
    /// Targets whose identifier has no source.
    pub unmatched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Linkage {
    pub writes: WriteSet,
    pub warnings: Vec<LinkageWarning>,
    pub stats: LinkageStats,
}

/// Back-fills continuation rows in place and returns the cell writes that
/// mirror those fills. Rows are untouched when a required column is missing.
/// Never overwrites a non-empty field, so a second pass stages nothing.
pub fn link(
    header: &Header,
    rows: &mut [Row],
    cols: &LinkageColumns,
) -> Result<Linkage, LinkageError> {
    let resolved = resolve_columns(header, cols)?;
    let Classification {
        sources,
        targets,
        warnings,
    } = classify(rows, cols);

    let mut writes = WriteSet::default();
    let mut stats = LinkageStats {
        rows: rows.len(),
        sources: sources.len(),
        targets: targets.len(),
        ..LinkageStats::default()
    };

    for target in &targets {
        let Some(row) = rows.get_mut(target.index) else {
            continue;
        };
        let before = writes.len();

        if row.is_empty_at(&cols.comparison_id) {
            row.set(&cols.comparison_id, target.identifier.as_str());
            writes.stage(target.row_number, resolved.comparison_col, target.identifier.as_str());
        }

        match sources.get(&target.identifier) {
            Some(source) => {
                for (name, col) in &resolved.fill {
                    if !row.is_empty_at(name) {
                        continue;
                    }
                    let value = source.get(name);
                    if value.is_empty() {
                        continue;
                    }
                    row.set(name, value);
                    writes.stage(target.row_number, *col, value);
                }
            }
            None => {
                stats.unmatched += 1;
                debug!(
                    row = target.row_number,
                    id = %target.identifier,
                    "no source for identifier"
                );
            }
        }

        if writes.len() > before {
            stats.filled_rows += 1;
        }
    }

    Ok(Linkage {
        writes,
        warnings,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkageColumns, RegistrantKind};

    const TRIGGER: &str = "JÁ CADASTREI MEUS DADOS PESSOAIS, QUERO CADASTRAR OUTRO VEÍCULO";
    const CMP: &str = "CPF (somente número)";
    const TRIG: &str = "CPF - (SOMENTE NÚMERO)";

    fn cols() -> LinkageColumns {
        LinkageColumns::defaults(RegistrantKind::Pf)
    }

    fn header(names: &[&str]) -> Header {
        let raw: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        Header::parse(&raw, "Status").expect("header")
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn scenario_header() -> Header {
        header(&["Status", "CADASTRO", CMP, TRIG, "NOME"])
    }

    #[test]
    fn continuation_row_is_filled_from_source() {
        let h = scenario_header();
        let mut rows = vec![
            row(&[
                ("Status", ""),
                ("CADASTRO", "NOVO"),
                (CMP, "12345678901"),
                (TRIG, ""),
                ("NOME", "ANA"),
            ]),
            row(&[
                ("Status", TRIGGER),
                ("CADASTRO", TRIGGER),
                (CMP, ""),
                (TRIG, "12345678901"),
                ("NOME", ""),
            ]),
        ];

        let out = link(&h, &mut rows, &cols()).expect("link");

        assert_eq!(rows[1].get(CMP), "12345678901");
        assert_eq!(rows[1].get("NOME"), "ANA");
        assert_eq!(
            out.writes.as_triples(),
            vec![(3, 3, "12345678901"), (3, 5, "ANA")]
        );
        assert_eq!(out.stats.targets, 1);
        assert_eq!(out.stats.filled_rows, 1);
        assert_eq!(out.stats.unmatched, 0);
    }

    #[test]
    fn first_source_wins_over_later_duplicates() {
        let h = header(&["Status", "CADASTRO", CMP, TRIG, "NOME", "PLACA", "EMAIL"]);
        let mut rows = vec![
            row(&[("CADASTRO", "NOVO"), (CMP, "111"), ("NOME", "PRIMEIRA"), ("EMAIL", "")]),
            row(&[("CADASTRO", "NOVO"), (CMP, "111"), ("NOME", "SEGUNDA"), ("EMAIL", "b@x")]),
            row(&[("CADASTRO", TRIGGER), (TRIG, "111"), ("PLACA", "ABC1234")]),
        ];

        let out = link(&h, &mut rows, &cols()).expect("link");

        assert_eq!(rows[2].get("NOME"), "PRIMEIRA");
        assert_eq!(rows[2].get("EMAIL"), "");
        assert_eq!(rows[2].get("PLACA"), "ABC1234");
        assert_eq!(out.stats.sources, 1);
    }

    #[test]
    fn fills_only_empty_fields_and_is_idempotent() {
        let h = scenario_header();
        let mut rows = vec![
            row(&[("CADASTRO", "NOVO"), (CMP, "9"), ("NOME", "ANA")]),
            row(&[("CADASTRO", TRIGGER), (CMP, "9"), (TRIG, "9"), ("NOME", "BIA")]),
            row(&[("CADASTRO", TRIGGER), (TRIG, "9"), ("NOME", "")]),
        ];

        let first = link(&h, &mut rows, &cols()).expect("first");
        assert_eq!(rows[1].get("NOME"), "BIA");
        assert_eq!(first.writes.as_triples(), vec![(4, 3, "9"), (4, 5, "ANA")]);

        let second = link(&h, &mut rows, &cols()).expect("second");
        assert!(second.writes.is_empty());
        assert_eq!(second.stats.filled_rows, 0);
    }

    #[test]
    fn unmatched_target_only_gets_comparison_id() {
        let h = scenario_header();
        let mut rows = vec![row(&[("CADASTRO", TRIGGER), (TRIG, "777"), ("NOME", "")])];

        let out = link(&h, &mut rows, &cols()).expect("link");

        assert_eq!(out.writes.as_triples(), vec![(2, 3, "777")]);
        assert_eq!(rows[0].get("NOME"), "");
        assert_eq!(out.stats.unmatched, 1);
    }

    #[test]
    fn missing_required_column_leaves_rows_untouched() {
        for missing in ["CADASTRO", CMP, TRIG] {
            let names: Vec<&str> = ["Status", "CADASTRO", CMP, TRIG, "NOME"]
                .into_iter()
                .filter(|n| *n != missing)
                .collect();
            let h = header(&names);
            let mut rows = vec![
                row(&[("CADASTRO", "NOVO"), (CMP, "1"), ("NOME", "ANA")]),
                row(&[("CADASTRO", TRIGGER), (TRIG, "1")]),
            ];
            let before = rows.clone();

            let e = link(&h, &mut rows, &cols()).expect_err("missing column");
            assert_eq!(e, LinkageError::MissingColumn(missing.to_string()));
            assert_eq!(rows, before);
        }
    }

    #[test]
    fn writes_follow_header_order_not_row_order() {
        let h = header(&["Status", "CADASTRO", CMP, TRIG, "ZETA", "ALFA", "MEIO"]);
        let mut rows = vec![
            row(&[("MEIO", "m"), ("ALFA", "a"), ("ZETA", "z"), (CMP, "5"), ("CADASTRO", "NOVO")]),
            row(&[("ALFA", ""), ("MEIO", ""), (TRIG, "5"), ("CADASTRO", TRIGGER), (CMP, "5")]),
        ];

        let out = link(&h, &mut rows, &cols()).expect("link");

        assert_eq!(
            out.writes.as_triples(),
            vec![(3, 5, "z"), (3, 6, "a"), (3, 7, "m")]
        );
    }

    #[test]
    fn control_columns_are_never_back_filled() {
        let h = header(&["Carimbo de data/hora", "Status", "CADASTRO", CMP, TRIG, "NOME"]);
        let mut rows = vec![
            row(&[
                ("Carimbo de data/hora", "01/01/2024"),
                ("Status", "GERADO"),
                ("CADASTRO", "NOVO"),
                (CMP, "1"),
                (TRIG, "x"),
                ("NOME", "ANA"),
            ]),
            row(&[("CADASTRO", TRIGGER), (TRIG, "1")]),
        ];

        let out = link(&h, &mut rows, &cols()).expect("link");

        assert_eq!(rows[1].get("Status"), "");
        assert_eq!(rows[1].get("Carimbo de data/hora"), "");
        assert_eq!(rows[1].get(TRIG), "1");
        assert_eq!(out.writes.as_triples(), vec![(3, 4, "1"), (3, 6, "ANA")]);
    }

    #[test]
    fn continuation_without_identifier_is_a_soft_warning() {
        let mut rows = vec![
            row(&[("CADASTRO", TRIGGER), (TRIG, "")]),
            row(&[("CADASTRO", ""), (CMP, "")]),
        ];
        let c = classify(&rows, &cols());
        assert!(c.targets.is_empty());
        assert_eq!(c.sources.len(), 0);
        assert_eq!(c.warnings.len(), 1);
        assert_eq!(c.warnings[0].row_number, 2);

        let before = rows.clone();
        let out = link(&scenario_header(), &mut rows, &cols()).expect("link");
        assert!(out.writes.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(rows, before);
    }

    #[test]
    fn continuation_rows_never_become_sources() {
        let rows = vec![
            row(&[("CADASTRO", TRIGGER), (CMP, "1"), (TRIG, "1"), ("NOME", "X")]),
            row(&[("CADASTRO", "NOVO"), (CMP, "1"), ("NOME", "Y")]),
        ];
        let c = classify(&rows, &cols());
        assert_eq!(c.sources.get("1").map(|r| r.get("NOME")), Some("Y"));
        assert_eq!(c.targets.len(), 1);
        assert_eq!(c.targets[0].row_number, 2);
    }
}
