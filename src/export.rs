use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ResultsError, ResultsResult};
use crate::grades::SubjectScore;
use crate::model::StudentRecord;

pub const SUMMARY_SEPARATOR: &str = ", ";

/// Renders a mark with `.` as decimal separator and no trailing `.0` for
/// whole numbers (`80`, `80.5`).
pub fn format_mark(v: f64) -> String {
    if !v.is_finite() || v == 0.0 {
        return "0".to_string();
    }
    // f64 Display never uses exponents or grouping.
    format!("{}", v)
}

pub fn render_subject(subject: &SubjectScore) -> String {
    format!(
        "{} (E:{}+I:{})",
        subject.name(),
        format_mark(subject.exam()),
        format_mark(subject.internal())
    )
}

/// Inverse of `reconcile::parse_subject_summary`.
pub fn render_subject_summary(subjects: &[SubjectScore]) -> String {
    subjects
        .iter()
        .map(render_subject)
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}

/// One spreadsheet row per student. Header names double as the import
/// column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Enrollment")]
    pub enrollment: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Course")]
    pub course: String,
    #[serde(rename = "Semester")]
    pub semester: String,
    #[serde(rename = "Subjects")]
    pub subjects: String,
    #[serde(rename = "Attendance")]
    pub attendance: String,
    #[serde(rename = "Internship")]
    pub internship: String,
    #[serde(rename = "Project")]
    pub project: String,
    /// Display only; never read back on import.
    #[serde(rename = "Grand Total")]
    pub grand_total: String,
}

pub fn project_row(record: &StudentRecord) -> FlatRow {
    let aggregate = record.aggregate();
    FlatRow {
        department: record.department.clone(),
        enrollment: record.enrollment_number.clone(),
        name: record.student_name.clone(),
        email: record.email.clone().unwrap_or_default(),
        password: record.password.clone(),
        course: record.course.clone(),
        semester: record.semester.clone(),
        subjects: render_subject_summary(&record.subjects),
        attendance: format_mark(record.attendance),
        internship: format_mark(record.internship),
        project: format_mark(record.project),
        grand_total: format_mark(aggregate.grand_total),
    }
}

pub fn project_rows(records: &[StudentRecord]) -> Vec<FlatRow> {
    records.iter().map(project_row).collect()
}

/// Destination of the derived spreadsheet mirror.
pub trait MirrorSink {
    fn write_rows(&self, rows: &[FlatRow]) -> ResultsResult<()>;
    fn delete_artifact(&self) -> ResultsResult<()>;
}

pub struct CsvMirror {
    path: PathBuf,
}

impl CsvMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MirrorSink for CsvMirror {
    fn write_rows(&self, rows: &[FlatRow]) -> ResultsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ResultsError::external("mirror", e))?;
        }
        // Write beside the artifact, then swap it in.
        let tmp = self.path.with_extension("csv.writing");
        {
            let mut writer = csv::Writer::from_path(&tmp)
                .map_err(|e| ResultsError::external("mirror", e))?;
            for row in rows {
                writer
                    .serialize(row)
                    .map_err(|e| ResultsError::external("mirror", e))?;
            }
            writer
                .flush()
                .map_err(|e| ResultsError::external("mirror", e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| ResultsError::external("mirror", e))?;
        Ok(())
    }

    fn delete_artifact(&self) -> ResultsResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResultsError::external("mirror", e)),
        }
    }
}
