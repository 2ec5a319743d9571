use serde_json::{json, Value};
use std::fs::File;

use crate::db::StudentStore;
use crate::error::{ResultsError, ResultsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, optional_str, required_str, store_and_mirror};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, StudentInput};

fn list(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let department = optional_str(req, "department");
    let students: Vec<Value> = conn
        .list(department.as_deref())?
        .iter()
        .map(|s| s.to_json_with_aggregate())
        .collect();
    Ok(json!({ "students": students }))
}

fn get(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let student = conn
        .find_by_id(&student_id)?
        .ok_or_else(|| ResultsError::not_found("student not found"))?;
    Ok(json!({ "student": student.to_json_with_aggregate() }))
}

fn upsert(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let (conn, mirror) = store_and_mirror(state)?;
    let input = StudentInput::from_params(&req.params)?;
    let outcome = reconcile::reconcile(conn, input)?;
    let mirror_synced = reconcile::sync_mirror(conn, &mirror);
    let message = if outcome.created {
        "New Student Added"
    } else {
        "Record Updated"
    };
    Ok(json!({
        "studentId": outcome.record.id,
        "created": outcome.created,
        "message": message,
        "mirrorSynced": mirror_synced
    }))
}

fn delete(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let (conn, mirror) = store_and_mirror(state)?;
    let student_id = required_str(req, "studentId")?;
    if !conn.delete(&student_id)? {
        return Err(ResultsError::not_found("student not found"));
    }
    tracing::info!(id = %student_id, "student deleted");
    let mirror_synced = reconcile::sync_mirror(conn, &mirror);
    Ok(json!({ "deleted": true, "mirrorSynced": mirror_synced }))
}

fn import_sheet(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let (conn, mirror) = store_and_mirror(state)?;
    let path = required_str(req, "path")?;
    let default_department = optional_str(req, "department");
    let file = File::open(&path).map_err(|e| {
        ResultsError::validation(format!("cannot open sheet {path}: {e}"))
    })?;

    let summary = reconcile::import_sheet(conn, file, default_department.as_deref())?;
    let mirror_synced = reconcile::sync_mirror(conn, &mirror);
    Ok(json!({
        "processed": summary.processed,
        "created": summary.created,
        "updated": summary.updated,
        "skipped": summary.skipped,
        "failed": summary.failed,
        "message": format!("Processed {} records", summary.processed),
        "mirrorSynced": mirror_synced
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state, req),
        "students.get" => get(state, req),
        "students.upsert" => upsert(state, req),
        "students.delete" => delete(state, req),
        "students.importSheet" => import_sheet(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
