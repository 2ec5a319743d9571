use rusqlite::Connection;
use serde_json::Value;

use crate::error::{ResultsError, ResultsResult};
use crate::export::CsvMirror;
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> ResultsResult<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ResultsError::validation(format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn db_conn(state: &AppState) -> ResultsResult<&Connection> {
    state.db.as_ref().ok_or(ResultsError::NoWorkspace)
}

/// Store plus the mirror sink of the selected workspace.
pub fn store_and_mirror(state: &AppState) -> ResultsResult<(&Connection, CsvMirror)> {
    let conn = db_conn(state)?;
    let mirror = state.mirror().ok_or(ResultsError::NoWorkspace)?;
    Ok((conn, mirror))
}
