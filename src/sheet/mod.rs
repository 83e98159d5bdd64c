//! Sheet store seam: the spreadsheet holding form responses, addressed by
//! 1-based (row, column) cells with the header on row 1.

mod sqlite;

pub use sqlite::SqliteSheet;

use crate::row::{record_from_cells, Header, HeaderError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Failure talking to the store. A failed batch is failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("quota exceeded: {0}")]
    Quota(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error("invalid cell address `{0}`")]
    InvalidAddress(String),
}

impl RemoteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::RateLimited(_) => "rate_limited",
            Self::Quota(_) => "quota",
            Self::Network(_) => "network",
            Self::Store(_) => "store",
            Self::InvalidAddress(_) => "invalid_address",
        }
    }
}

/// Workspace-store failures reported under the same codes as a remote store.
impl From<rusqlite::Error> for RemoteError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        let msg = e.to_string();
        match e.sqlite_error_code() {
            Some(
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied,
            ) => Self::Auth(msg),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::RateLimited(msg),
            Some(ErrorCode::DiskFull | ErrorCode::TooBig) => Self::Quota(msg),
            Some(ErrorCode::CannotOpen | ErrorCode::SystemIoFailure) => Self::Network(msg),
            _ => Self::Store(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn to_a1(self) -> String {
        let mut letters = Vec::new();
        let mut n = self.col;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        format!("{}{}", String::from_utf8_lossy(&letters), self.row)
    }

    pub fn parse_a1(raw: &str) -> Result<Self, RemoteError> {
        let bad = || RemoteError::InvalidAddress(raw.to_string());
        let s = raw.trim().to_ascii_uppercase();
        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(bad)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(bad());
        }
        let mut col: u32 = 0;
        for c in letters.bytes() {
            col = col
                .checked_mul(26)
                .and_then(|v| v.checked_add((c - b'A' + 1) as u32))
                .ok_or_else(bad)?;
        }
        let row: u32 = digits.parse().map_err(|_| bad())?;
        if row == 0 {
            return Err(bad());
        }
        Ok(Self { row, col })
    }
}

impl Serialize for CellAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_a1())
    }
}

impl<'de> Deserialize<'de> for CellAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        CellAddress::parse_a1(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInputOption {
    /// Store interprets the text as if typed into the UI.
    UserEntered,
    Raw,
}

/// One single-cell range. `values` is always a 1x1 matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub range: CellAddress,
    pub values: Vec<Vec<String>>,
}

impl ValueRange {
    pub fn single(range: CellAddress, value: String) -> Self {
        Self {
            range,
            values: vec![vec![value]],
        }
    }

    pub fn value(&self) -> &str {
        self.values
            .first()
            .and_then(|r| r.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    pub value_input_option: ValueInputOption,
    pub data: Vec<ValueRange>,
}

impl BatchUpdate {
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// Text to send in user-entered mode so a digit string with a leading zero
/// stays literal text.
pub fn user_entered_text(value: &str) -> String {
    let keeps_zero = value.len() > 1
        && value.starts_with('0')
        && value.bytes().all(|b| b.is_ascii_digit());
    if keeps_zero {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

/// Inverse of [`user_entered_text`] as applied by the store on write.
pub fn stored_text(value: &str, option: ValueInputOption) -> String {
    match option {
        ValueInputOption::UserEntered => value.strip_prefix('\'').unwrap_or(value).to_string(),
        ValueInputOption::Raw => value.to_string(),
    }
}

pub trait SheetStore {
    fn title(&self) -> &str;

    /// Raw row 1.
    fn header_row(&self) -> Result<Vec<String>, RemoteError>;

    /// Raw rows 2..=last, in sheet order.
    fn data_rows(&self) -> Result<Vec<Vec<Value>>, RemoteError>;

    fn batch_update(&mut self, update: &BatchUpdate) -> Result<(), RemoteError>;

    /// Removes whole rows; later rows move up.
    fn delete_rows(&mut self, rows: &[u32]) -> Result<(), RemoteError>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("sheet `{title}` has an invalid header: {source}")]
    Header {
        title: String,
        #[source]
        source: HeaderError,
    },
    #[error("failed to read sheet `{title}`: {source}")]
    Remote {
        title: String,
        #[source]
        source: RemoteError,
    },
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Header { .. } => "sheet_invalid",
            Self::Remote { .. } => "remote_failed",
        }
    }
}

/// Header plus one raw record per data row; record `i` is sheet row `i + 2`.
#[derive(Debug, Clone)]
pub struct LoadedSheet {
    pub title: String,
    pub header: Header,
    pub records: Vec<Vec<(String, Value)>>,
}

pub fn load_sheet(store: &dyn SheetStore, status_column: &str) -> Result<LoadedSheet, LoadError> {
    let title = store.title().to_string();
    let raw_header = store.header_row().map_err(|source| LoadError::Remote {
        title: title.clone(),
        source,
    })?;
    let header = Header::parse(&raw_header, status_column).map_err(|source| LoadError::Header {
        title: title.clone(),
        source,
    })?;
    let rows = store.data_rows().map_err(|source| LoadError::Remote {
        title: title.clone(),
        source,
    })?;
    let records = rows
        .iter()
        .map(|cells| record_from_cells(&header, cells))
        .collect();
    tracing::debug!(sheet = %title, columns = header.len(), "sheet loaded");
    Ok(LoadedSheet {
        title,
        header,
        records,
    })
}
