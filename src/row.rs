use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header row is empty")]
    Empty,
    #[error("duplicate header names (case-insensitive): {}", describe_duplicates(.0))]
    Duplicate(Vec<(String, usize)>),
    #[error("required column `{0}` not found in header")]
    MissingStatus(String),
}

fn describe_duplicates(dups: &[(String, usize)]) -> String {
    dups.iter()
        .map(|(name, count)| format!("{name} x{count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Header row of a sheet: trimmed, non-blank column names, each paired with
/// the 1-based sheet column it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<(String, u32)>,
}

impl Header {
    /// Cleans a raw header row and validates it. Blank cells are dropped but
    /// the remaining names keep their true column positions.
    pub fn parse(raw: &[String], status_column: &str) -> Result<Self, HeaderError> {
        let columns: Vec<(String, u32)> = raw
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), (i + 1) as u32))
            })
            .collect();
        if columns.is_empty() {
            return Err(HeaderError::Empty);
        }

        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for (name, _) in &columns {
            *counts.entry(name.to_lowercase()).or_insert(0) += 1;
        }
        let duplicates: Vec<(String, usize)> =
            counts.into_iter().filter(|(_, n)| *n > 1).collect();
        if !duplicates.is_empty() {
            return Err(HeaderError::Duplicate(duplicates));
        }

        if !columns.iter().any(|(name, _)| name == status_column) {
            return Err(HeaderError::MissingStatus(status_column.to_string()));
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[(String, u32)] {
        &self.columns
    }

    /// 1-based sheet column for an exact (case-sensitive) name.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, col)| *col)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

/// One sheet row as column name -> text. Absent keys read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: IndexMap<String, String>,
}

impl Row {
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Lookup ignoring case and surrounding whitespace of the column name.
    pub fn get_ci(&self, column: &str) -> Option<&str> {
        let wanted = column.trim().to_uppercase();
        self.cells
            .iter()
            .find(|(k, _)| k.to_uppercase() == wanted)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty_at(&self, column: &str) -> bool {
        self.get(column).is_empty()
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        match self.cells.get_mut(column) {
            Some(slot) => *slot = value.into(),
            None => {
                self.cells.insert(column.to_string(), value.into());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Text form of a raw cell. Null becomes "", strings are trimmed.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Canonical row from a raw record: keys trimmed, blank keys dropped, every
/// value rendered as text. Never fails.
pub fn normalize_record<'a, I>(raw: I) -> Row
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut cells: IndexMap<String, String> = IndexMap::new();
    for (key, value) in raw {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        cells.insert(key.to_string(), cell_text(value));
    }
    Row { cells }
}

pub fn normalize_records(records: &[Vec<(String, Value)>]) -> Vec<Row> {
    records
        .iter()
        .map(|rec| normalize_record(rec.iter().map(|(k, v)| (k.as_str(), v))))
        .collect()
}

/// Pairs every header column with the cell at its position in a raw data row.
pub fn record_from_cells(header: &Header, cells: &[Value]) -> Vec<(String, Value)> {
    header
        .columns()
        .iter()
        .map(|(name, col)| {
            let value = cells
                .get((*col - 1) as usize)
                .cloned()
                .unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect()
}
