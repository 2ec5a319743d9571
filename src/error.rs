use serde_json::{json, Value};

/// Errors raised by the results core and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("subject summary does not match the expected pattern: {0}")]
    Parse(String),

    #[error("{service} failed: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("select a workspace first")]
    NoWorkspace,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid otp")]
    InvalidOtp,

    #[error("otp expired")]
    OtpExpired,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ResultsResult<T> = Result<T, ResultsError>;

impl ResultsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn external(service: &'static str, message: impl ToString) -> Self {
        Self::ExternalService {
            service,
            message: message.to_string(),
        }
    }

    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            ResultsError::Validation(_) => "bad_params",
            ResultsError::NotFound(_) => "not_found",
            ResultsError::Parse(_) => "parse_failed",
            ResultsError::ExternalService { .. } => "external_service_failed",
            ResultsError::Conflict(_) => "conflict",
            ResultsError::NoWorkspace => "no_workspace",
            ResultsError::InvalidCredentials => "invalid_credentials",
            ResultsError::InvalidOtp => "invalid_otp",
            ResultsError::OtpExpired => "otp_expired",
            ResultsError::Db(_) => "db_query_failed",
            ResultsError::Json(_) => "bad_json",
            ResultsError::Io(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            ResultsError::ExternalService { service, .. } => Some(json!({ "service": service })),
            _ => None,
        }
    }
}

impl From<csv::Error> for ResultsError {
    fn from(e: csv::Error) -> Self {
        ResultsError::external("spreadsheet", e)
    }
}
