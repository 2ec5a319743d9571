use serde::Serialize;

use crate::grades::{self, AggregateResult, SubjectScore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub enrollment_number: String,
    pub student_name: String,
    pub email: Option<String>,
    pub password: String,
    pub department: String,
    pub course: String,
    pub semester: String,
    pub subjects: Vec<SubjectScore>,
    #[serde(rename = "attendanceMarks")]
    pub attendance: f64,
    #[serde(rename = "internshipMarks")]
    pub internship: f64,
    #[serde(rename = "projectMarks")]
    pub project: f64,
    pub updated_at: Option<String>,
}

impl StudentRecord {
    /// A usable delivery address must at least contain `@`.
    pub fn deliverable_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| e.contains('@'))
    }

    pub fn aggregate(&self) -> AggregateResult {
        grades::aggregate(self)
    }

    pub fn to_json_with_aggregate(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = v.as_object_mut() {
            obj.insert(
                "aggregate".to_string(),
                serde_json::to_value(self.aggregate()).unwrap_or_default(),
            );
        }
        v
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminRecord {
    pub id: String,
    pub email: String,
    pub password: String,
    pub department: String,
    pub otp_digest: Option<String>,
    pub otp_expires_at: Option<String>,
}
