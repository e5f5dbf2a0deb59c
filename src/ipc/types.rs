use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line as read off stdin. `params` falls back to JSON null when
/// the caller omits it, so handlers can probe it uniformly.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the daemon holds between requests: the selected workspace and
/// the database opened inside it. Both stay `None` until `workspace.select`.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
