use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One stdin frame: `{"id", "method", "params"}`. Missing params decode as
/// JSON null; handlers treat that the same as an empty object.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state: the selected workspace directory and the open database
/// inside it. Both are `None` until `workspace.select` succeeds.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
