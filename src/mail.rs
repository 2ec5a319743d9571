use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ResultsError, ResultsResult};
use crate::marksheet::{document_file_name, RenderedDocument};
use crate::model::{AdminRecord, StudentRecord};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub from: String,
    pub reply_to: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Outbound mail transport.
pub trait DeliverySink {
    /// Returns a transport-assigned message id.
    fn deliver(&self, message: &OutgoingMessage) -> ResultsResult<String>;
}

fn sender_address(config: &Config) -> ResultsResult<&str> {
    config
        .system_email
        .as_deref()
        .ok_or_else(|| ResultsError::external("delivery", "system sender address is not configured"))
}

/// Marksheet email. Replies go to the department admin when one is
/// registered, otherwise back to the system sender.
pub fn compose_marksheet_email(
    config: &Config,
    student: &StudentRecord,
    department_admin: Option<&AdminRecord>,
    document: RenderedDocument,
) -> ResultsResult<OutgoingMessage> {
    let to = student.deliverable_email().ok_or_else(|| {
        ResultsError::validation(format!(
            "Invalid Email for student: {}",
            student.student_name
        ))
    })?;
    let system = sender_address(config)?;
    let (display, reply_to) = match department_admin {
        Some(admin) => (
            format!("{} {}", config.institution, student.department),
            admin.email.clone(),
        ),
        None => (format!("{} Admin", config.institution), system.to_string()),
    };

    Ok(OutgoingMessage {
        from: format!("{display} <{system}>"),
        reply_to: Some(reply_to),
        to: to.to_string(),
        subject: format!("Result: {} ({})", student.student_name, student.department),
        body: format!(
            "Dear {},\n\nPlease find your official marksheet attached for {} ({}).\n\nRegards,\n{}",
            student.student_name, student.course, student.department, config.institution
        ),
        attachment: Some(Attachment {
            file_name: document_file_name(student, document.extension),
            content_type: document.content_type.to_string(),
            bytes: document.bytes,
        }),
    })
}

pub fn compose_otp_email(config: &Config, admin_email: &str, code: &str) -> ResultsResult<OutgoingMessage> {
    let system = sender_address(config)?;
    Ok(OutgoingMessage {
        from: system.to_string(),
        reply_to: None,
        to: admin_email.to_string(),
        subject: format!("{} Admin Password Reset", config.institution),
        body: format!("Your Password Reset OTP is: {code}"),
        attachment: None,
    })
}

/// Writes each message to `<outbox>/<id>.json`, with the attachment beside it.
pub struct OutboxDelivery {
    dir: PathBuf,
}

impl OutboxDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DeliverySink for OutboxDelivery {
    fn deliver(&self, message: &OutgoingMessage) -> ResultsResult<String> {
        let fail = |e: std::io::Error| ResultsError::external("delivery", e);
        std::fs::create_dir_all(&self.dir).map_err(fail)?;
        let id = Uuid::new_v4().to_string();

        let mut envelope = serde_json::to_value(message)?;
        if let Some(att) = &message.attachment {
            let att_name = format!("{id}-{}", att.file_name);
            std::fs::write(self.dir.join(&att_name), &att.bytes).map_err(fail)?;
            envelope["attachment"]["storedAs"] = serde_json::Value::String(att_name);
            envelope["attachment"]["size"] = serde_json::json!(att.bytes.len());
        }
        envelope["messageId"] = serde_json::Value::String(id.clone());
        std::fs::write(
            self.dir.join(format!("{id}.json")),
            serde_json::to_string_pretty(&envelope)?,
        )
        .map_err(fail)?;

        info!(to = %message.to, subject = %message.subject, message_id = %id, "message queued to outbox");
        Ok(id)
    }
}
