use std::path::PathBuf;

use crate::pipeline::Session;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Projection from the last `linkage.run`; cleared whenever row numbers
    /// may have moved.
    pub session: Option<Session>,
}
