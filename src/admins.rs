use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::{ResultsError, ResultsResult};
use crate::mail::{self, DeliverySink};
use crate::model::AdminRecord;

fn otp_digest(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.trim().as_bytes()))
}

/// Six decimal digits, 100000..=999999. The random bits of a v4 uuid are
/// the entropy source.
fn generate_otp() -> String {
    let n = Uuid::new_v4().as_u128() % 900_000 + 100_000;
    n.to_string()
}

fn non_blank(v: &str, field: &str) -> ResultsResult<String> {
    let t = v.trim();
    if t.is_empty() {
        return Err(ResultsError::validation(format!("missing {field}")));
    }
    Ok(t.to_string())
}

pub fn register(
    conn: &Connection,
    email: &str,
    password: &str,
    department: &str,
) -> ResultsResult<AdminRecord> {
    let email = non_blank(email, "email")?;
    if password.is_empty() {
        return Err(ResultsError::validation("missing password"));
    }
    let department = non_blank(department, "department")?;
    if db::admin_by_email(conn, &email)?.is_some() {
        return Err(ResultsError::Conflict("Email already registered".into()));
    }

    let admin = AdminRecord {
        id: Uuid::new_v4().to_string(),
        email,
        password: password.to_string(),
        department,
        otp_digest: None,
        otp_expires_at: None,
    };
    db::admin_insert(conn, &admin)?;
    info!(email = %admin.email, department = %admin.department, "department admin registered");
    Ok(admin)
}

pub fn login(conn: &Connection, email: &str, password: &str) -> ResultsResult<AdminRecord> {
    match db::admin_by_email(conn, email.trim())? {
        Some(admin) if admin.password == password => Ok(admin),
        _ => Err(ResultsError::InvalidCredentials),
    }
}

/// Stores a fresh one-time code for the admin and mails it. Returns the
/// expiry timestamp.
pub fn issue_otp(
    conn: &Connection,
    config: &Config,
    sink: &dyn DeliverySink,
    email: &str,
    now: DateTime<Utc>,
) -> ResultsResult<String> {
    let admin = db::admin_by_email(conn, email.trim())?
        .ok_or_else(|| ResultsError::not_found("Email not registered"))?;
    let code = generate_otp();
    let expires_at = (now + Duration::minutes(config.otp_ttl_minutes))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let message = mail::compose_otp_email(config, &admin.email, &code)?;

    db::admin_set_otp(conn, &admin.id, Some(&otp_digest(&code)), Some(&expires_at))?;
    if let Err(e) = sink.deliver(&message) {
        db::admin_set_otp(conn, &admin.id, None, None)?;
        return Err(e);
    }
    info!(email = %admin.email, "password reset otp issued");
    Ok(expires_at)
}

/// Consumes the one-time code and sets the new password. An expired code is
/// cleared so it can never be retried.
pub fn reset_password(
    conn: &Connection,
    email: &str,
    otp: &str,
    new_password: &str,
    now: DateTime<Utc>,
) -> ResultsResult<()> {
    if new_password.is_empty() {
        return Err(ResultsError::validation("missing newPassword"));
    }
    let admin = db::admin_by_email(conn, email.trim())?.ok_or(ResultsError::InvalidOtp)?;
    let Some(stored) = admin.otp_digest.as_deref() else {
        return Err(ResultsError::InvalidOtp);
    };
    if stored != otp_digest(otp) {
        return Err(ResultsError::InvalidOtp);
    }

    let expired = admin
        .otp_expires_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|exp| now > exp.with_timezone(&Utc))
        .unwrap_or(true);
    if expired {
        db::admin_set_otp(conn, &admin.id, None, None)?;
        warn!(email = %admin.email, "expired otp presented");
        return Err(ResultsError::OtpExpired);
    }

    db::admin_set_password(conn, &admin.id, new_password)?;
    info!(email = %admin.email, "admin password reset");
    Ok(())
}
