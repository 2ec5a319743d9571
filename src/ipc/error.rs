use serde_json::json;

use crate::error::ResultsError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn results_err(id: &str, e: &ResultsError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), e.details())
}

/// Envelope for a handler body that reports failures as `ResultsError`.
pub fn respond(id: &str, result: Result<serde_json::Value, ResultsError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => results_err(id, &e),
    }
}
