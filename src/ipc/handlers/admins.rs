use chrono::Utc;
use serde_json::{json, Value};

use crate::admins;
use crate::error::{ResultsError, ResultsResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};

/// Passwords are taken verbatim; only an absent or empty value is rejected.
fn password_param(req: &Request, key: &str) -> ResultsResult<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResultsError::validation(format!("missing {}", key)))
}

fn register(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let admin = admins::register(
        conn,
        &required_str(req, "email")?,
        &password_param(req, "password")?,
        &required_str(req, "department")?,
    )?;
    Ok(json!({
        "adminId": admin.id,
        "message": "Department Registered Successfully!"
    }))
}

fn login(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let admin = admins::login(
        conn,
        &required_str(req, "email")?,
        &password_param(req, "password")?,
    )?;
    Ok(json!({
        "message": "Login Successful",
        "email": admin.email,
        "department": admin.department
    }))
}

fn send_otp(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    let outbox = state.outbox().ok_or(ResultsError::NoWorkspace)?;
    let expires_at = admins::issue_otp(
        conn,
        &state.config,
        &outbox,
        &required_str(req, "email")?,
        Utc::now(),
    )?;
    Ok(json!({ "message": "OTP Sent", "expiresAt": expires_at }))
}

fn reset_password(state: &AppState, req: &Request) -> ResultsResult<Value> {
    let conn = db_conn(state)?;
    admins::reset_password(
        conn,
        &required_str(req, "email")?,
        &required_str(req, "otp")?,
        &password_param(req, "newPassword")?,
        Utc::now(),
    )?;
    Ok(json!({ "message": "Password Changed" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admins.register" => register(state, req),
        "admins.login" => login(state, req),
        "admins.sendOtp" => send_otp(state, req),
        "admins.resetPassword" => reset_password(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
