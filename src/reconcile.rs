use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::StudentStore;
use crate::error::{ResultsError, ResultsResult};
use crate::export::{self, MirrorSink};
use crate::grades::{coerce_mark, coerce_mark_str, SubjectScore};
use crate::model::StudentRecord;

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parses `"<name> (E:<exam>+I:<internal>)"` entries joined by `", "`.
///
/// Blank input (or the spreadsheet `nan` placeholder) is an empty list. A
/// non-blank string without a single well-formed entry is a parse error.
/// Text that does not form an entry between well-formed ones is skipped.
pub fn parse_subject_summary(text: &str) -> ResultsResult<Vec<SubjectScore>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut rest = trimmed;
    while let Some((name_end, consumed, exam, internal)) = find_entry(rest) {
        let mut name = &rest[..name_end];
        if !out.is_empty() {
            name = name.strip_prefix(export::SUMMARY_SEPARATOR).unwrap_or(name);
        }
        out.push(SubjectScore::new(name, exam, internal));
        rest = &rest[name_end + consumed..];
    }

    if out.is_empty() {
        return Err(ResultsError::Parse(trimmed.to_string()));
    }
    Ok(out)
}

/// Earliest position where a score tail starts. Returns
/// (name_end, tail_len, exam, internal).
///
/// An unnamed leading entry has lost its space to trimming, so a bare
/// `(E:` is accepted at offset 0.
fn find_entry(s: &str) -> Option<(usize, usize, f64, f64)> {
    if let Some((len, e, i)) = match_tail(s, b"(E:") {
        return Some((0, len, e, i));
    }
    s.char_indices()
        .find_map(|(p, _)| match_tail(&s[p..], b" (E:").map(|(len, e, i)| (p, len, e, i)))
}

fn match_tail(s: &str, opening: &[u8]) -> Option<(usize, f64, f64)> {
    let b = s.as_bytes();
    let mut pos = 0usize;
    expect(b, &mut pos, opening)?;
    let exam = number(s, &mut pos)?;
    expect(b, &mut pos, b"+I:")?;
    let internal = number(s, &mut pos)?;
    expect(b, &mut pos, b")")?;
    Some((pos, exam, internal))
}

fn expect(b: &[u8], pos: &mut usize, lit: &[u8]) -> Option<()> {
    if b.len() >= *pos + lit.len() && &b[*pos..*pos + lit.len()] == lit {
        *pos += lit.len();
        Some(())
    } else {
        None
    }
}

/// `digits ( "." digits )?`
fn number(s: &str, pos: &mut usize) -> Option<f64> {
    let b = s.as_bytes();
    let digits = |from: usize| b[from..].iter().take_while(|c| c.is_ascii_digit()).count();
    let start = *pos;
    let int_len = digits(start);
    if int_len == 0 {
        return None;
    }
    let mut end = start + int_len;
    if b.get(end) == Some(&b'.') {
        let frac_len = digits(end + 1);
        if frac_len > 0 {
            end += 1 + frac_len;
        }
    }
    *pos = end;
    s[start..end].parse::<f64>().ok()
}

/// A full student record as submitted, before it is merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentInput {
    pub enrollment_number: String,
    pub student_name: String,
    pub email: Option<String>,
    pub password: String,
    pub department: String,
    pub course: String,
    pub semester: String,
    pub subjects: Vec<SubjectScore>,
    pub attendance: f64,
    pub internship: f64,
    pub project: f64,
}

fn param<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| params.get(*k)).filter(|v| !v.is_null())
}

fn param_text(params: &Value, keys: &[&str]) -> Option<String> {
    let v = param(params, keys)?;
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn required_text(params: &Value, keys: &[&str]) -> ResultsResult<String> {
    param_text(params, keys).ok_or_else(|| ResultsError::validation(format!("missing {}", keys[0])))
}

impl StudentInput {
    /// Reads an API submission. Both camelCase and snake_case keys are
    /// accepted; required fields must be non-blank.
    pub fn from_params(params: &Value) -> ResultsResult<Self> {
        let subjects = match param(params, &["subjects"]) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(SubjectScore::from_value).collect(),
            Some(Value::String(s)) => parse_subject_summary(s)?,
            Some(_) => return Err(ResultsError::validation("subjects must be an array")),
        };

        Ok(Self {
            enrollment_number: required_text(params, &["enrollmentNumber", "enrollment_number"])?,
            student_name: required_text(params, &["studentName", "student_name"])?,
            email: param_text(params, &["email"]),
            password: required_text(params, &["password"])?,
            department: required_text(params, &["department"])?,
            course: param_text(params, &["course"]).unwrap_or_default(),
            semester: param_text(params, &["semester"]).unwrap_or_default(),
            subjects,
            attendance: coerce_mark(param(params, &["attendanceMarks", "attendance_marks"])),
            internship: coerce_mark(param(params, &["internshipMarks", "internship_marks"])),
            project: coerce_mark(param(params, &["projectMarks", "project_marks"])),
        })
    }

    fn into_record(self, id: String, updated_at: String) -> StudentRecord {
        StudentRecord {
            id,
            enrollment_number: self.enrollment_number,
            student_name: self.student_name,
            email: self.email,
            password: self.password,
            department: self.department,
            course: self.course,
            semester: self.semester,
            subjects: self.subjects,
            attendance: self.attendance,
            internship: self.internship,
            project: self.project,
            updated_at: Some(updated_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub record: StudentRecord,
    pub created: bool,
}

/// Merges one record keyed by enrollment number. An existing record keeps
/// its id and has every other field replaced.
pub fn reconcile<S: StudentStore + ?Sized>(
    store: &S,
    input: StudentInput,
) -> ResultsResult<ReconcileOutcome> {
    let existing = store.find_by_enrollment(&input.enrollment_number)?;
    let (id, created) = match existing {
        Some(r) => (r.id, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    let record = input.into_record(id, now_timestamp());
    store.upsert(&record)?;
    info!(
        enrollment = %record.enrollment_number,
        id = %record.id,
        created,
        "student reconciled"
    );
    Ok(ReconcileOutcome { record, created })
}

/// Rebuilds the mirror from the whole store. An empty store removes the
/// artifact. Returns the number of rows written.
pub fn refresh_mirror<S: StudentStore + ?Sized>(
    store: &S,
    sink: &dyn MirrorSink,
) -> ResultsResult<usize> {
    let records = store.list(None)?;
    if records.is_empty() {
        sink.delete_artifact()?;
        debug!("store empty, mirror artifact removed");
        return Ok(0);
    }
    let rows = export::project_rows(&records);
    sink.write_rows(&rows)?;
    debug!(rows = rows.len(), "mirror rebuilt");
    Ok(rows.len())
}

/// Like `refresh_mirror`, for use after a committed mutation: a failure is
/// logged and reported as `false`.
pub fn sync_mirror<S: StudentStore + ?Sized>(store: &S, sink: &dyn MirrorSink) -> bool {
    match refresh_mirror(store, sink) {
        Ok(_) => true,
        Err(e) => {
            warn!("mirror sync failed: {e}");
            false
        }
    }
}

/// Raw spreadsheet row, keyed by the mirror's header names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SheetRow {
    #[serde(rename = "Department")]
    pub department: Option<String>,
    #[serde(rename = "Enrollment")]
    pub enrollment: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Password")]
    pub password: Option<String>,
    #[serde(rename = "Course")]
    pub course: Option<String>,
    #[serde(rename = "Semester")]
    pub semester: Option<String>,
    #[serde(rename = "Subjects")]
    pub subjects: Option<String>,
    #[serde(rename = "Attendance")]
    pub attendance: Option<String>,
    #[serde(rename = "Internship")]
    pub internship: Option<String>,
    #[serde(rename = "Project")]
    pub project: Option<String>,
}

/// Blank cells and the textual `nan` placeholder both mean "missing".
fn cell(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
}

fn cell_mark(raw: Option<String>) -> f64 {
    cell(raw).map(|s| coerce_mark_str(&s)).unwrap_or(0.0)
}

impl SheetRow {
    /// `Ok(None)` means the row has no enrollment number and is skipped.
    pub fn into_input(self, default_department: Option<&str>) -> ResultsResult<Option<StudentInput>> {
        let Some(enrollment) = cell(self.enrollment) else {
            return Ok(None);
        };
        let department = cell(self.department)
            .or_else(|| default_department.and_then(|d| cell(Some(d.to_string()))))
            .ok_or_else(|| {
                ResultsError::validation(format!("row {enrollment}: no department and no default"))
            })?;
        let subjects = match cell(self.subjects) {
            None => Vec::new(),
            Some(text) => parse_subject_summary(&text).unwrap_or_else(|e| {
                warn!(enrollment = %enrollment, "{e}; importing without subjects");
                Vec::new()
            }),
        };

        Ok(Some(StudentInput {
            student_name: cell(self.name).unwrap_or_else(|| "Unknown".to_string()),
            email: cell(self.email),
            password: cell(self.password).unwrap_or_else(|| enrollment.clone()),
            department,
            course: cell(self.course).unwrap_or_default(),
            semester: cell(self.semester).unwrap_or_default(),
            subjects,
            attendance: cell_mark(self.attendance),
            internship: cell_mark(self.internship),
            project: cell_mark(self.project),
            enrollment_number: enrollment,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Imports every row of a CSV sheet. Each row stands alone: a bad row is
/// logged and counted as failed, never aborting the batch.
pub fn import_sheet<S: StudentStore + ?Sized, R: Read>(
    store: &S,
    sheet: R,
    default_department: Option<&str>,
) -> ResultsResult<ImportSummary> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(sheet);
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == "Enrollment") {
        return Err(ResultsError::validation("sheet has no Enrollment column"));
    }

    let mut summary = ImportSummary::default();
    for (idx, row) in reader.deserialize::<SheetRow>().enumerate() {
        let line = idx + 2;
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                warn!(line, "unreadable sheet row: {e}");
                summary.failed += 1;
                continue;
            }
        };
        let input = match row.into_input(default_department) {
            Ok(Some(input)) => input,
            Ok(None) => {
                debug!(line, "row without enrollment skipped");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(line, "row rejected: {e}");
                summary.failed += 1;
                continue;
            }
        };
        match reconcile(store, input) {
            Ok(outcome) => {
                summary.processed += 1;
                if outcome.created {
                    summary.created += 1;
                } else {
                    summary.updated += 1;
                }
            }
            Err(e) => {
                warn!(line, "row not stored: {e}");
                summary.failed += 1;
            }
        }
    }
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        "sheet import finished"
    );
    Ok(summary)
}
