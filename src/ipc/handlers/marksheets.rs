use serde_json::{json, Value};
use std::path::PathBuf;

use crate::db::{self, StudentStore};
use crate::error::{ResultsError, ResultsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::mail::{self, DeliverySink};
use crate::marksheet::{self, DocumentRenderer};
use crate::model::StudentRecord;

fn load_student(state: &AppState, req: &Request) -> ResultsResult<StudentRecord> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    conn.find_by_id(&student_id)?
        .ok_or_else(|| ResultsError::not_found("Student not found"))
}

fn render(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let student = load_student(state, req)?;
    let aggregate = student.aggregate();
    let markup = marksheet::render_marksheet(&student, &aggregate, &state.config.institution);

    let Some(out_path) = optional_str(req, "outPath").map(PathBuf::from) else {
        return Ok(json!({
            "markup": markup,
            "aggregate": aggregate
        }));
    };

    let document = state.renderer.render(&markup)?;
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ResultsError::external("render", e))?;
    }
    std::fs::write(&out_path, &document.bytes).map_err(|e| ResultsError::external("render", e))?;
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "fileName": marksheet::document_file_name(&student, document.extension),
        "contentType": document.content_type,
        "bytes": document.bytes.len(),
        "aggregate": aggregate
    }))
}

fn send(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let student = load_student(state, req)?;
    if student.deliverable_email().is_none() {
        return Err(ResultsError::validation(format!(
            "Invalid Email for student: {}",
            student.student_name
        )));
    }
    let admin = db::admin_by_department(conn, &student.department)?;
    let markup =
        marksheet::render_marksheet(&student, &student.aggregate(), &state.config.institution);
    let document = state.renderer.render(&markup)?;
    let message = mail::compose_marksheet_email(&state.config, &student, admin.as_ref(), document)?;

    let outbox = state.outbox().ok_or(ResultsError::NoWorkspace)?;
    let message_id = outbox.deliver(&message)?;
    Ok(json!({
        "messageId": message_id,
        "replyTo": message.reply_to,
        "message": format!("Email Sent Successfully to {}!", message.to)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "marksheets.render" => render(state, req),
        "marksheets.send" => send(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
