use serde_json::{json, Value};

use crate::error::{ResultsError, ResultsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::store_and_mirror;
use crate::ipc::types::{AppState, Request};
use crate::reconcile;

fn locate(state: &AppState) -> ResultsResult<Value> {
    let (_, mirror) = store_and_mirror(state)?;
    if !mirror.path().is_file() {
        return Err(ResultsError::not_found("No file created yet"));
    }
    Ok(json!({ "path": mirror.path().to_string_lossy() }))
}

fn rebuild(state: &AppState) -> ResultsResult<Value> {
    let (conn, mirror) = store_and_mirror(state)?;
    let rows = reconcile::refresh_mirror(conn, &mirror)?;
    Ok(json!({
        "rowsWritten": rows,
        "exists": rows > 0,
        "path": mirror.path().to_string_lossy()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "mirror.locate" => locate(state),
        "mirror.rebuild" => rebuild(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
