use crate::error::ResultsResult;
use crate::export::format_mark;
use crate::grades::{AggregateResult, Verdict};
use crate::model::StudentRecord;

const CELL: &str = "padding:8px; border:1px solid #ddd;";
const HEAD_CELL: &str = "padding:10px; border:1px solid #ddd; text-align:left;";

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn verdict_color(v: Verdict) -> &'static str {
    match v {
        Verdict::Pass => "green",
        Verdict::Fail => "red",
    }
}

/// Builds the marksheet markup. Pure: reads the record and its aggregate,
/// stores nothing.
pub fn render_marksheet(
    record: &StudentRecord,
    aggregate: &AggregateResult,
    institution: &str,
) -> String {
    let institution = escape_html(institution);
    let rows: String = record
        .subjects
        .iter()
        .map(|s| {
            format!(
                "<tr><td style='{CELL}'>{}</td><td style='{CELL}'>{}</td><td style='{CELL}'>{}</td><td style='{CELL}'><b>{}</b></td></tr>",
                escape_html(s.name()),
                format_mark(s.exam()),
                format_mark(s.internal()),
                format_mark(s.subject_total()),
            )
        })
        .collect();

    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif;">
  <div style="border: 2px solid #333; padding: 20px; max-width: 800px; margin: auto;">
    <h1 style="text-align: center; color: #2563eb; margin-bottom: 5px;">{institution_upper}</h1>
    <h3 style="text-align: center; color: #555; margin-top: 0px;">Department of {department}</h3>
    <hr>
    <p><b>Name:</b> {name}</p>
    <p><b>Enrollment:</b> {enrollment}</p>
    <p><b>Course:</b> {course} | <b>Sem:</b> {semester}</p>
    <table style="width: 100%; border-collapse: collapse; margin-top: 20px;">
      <tr style="background-color: #f2f2f2;">
        <th style="{HEAD_CELL}">Subject</th>
        <th style="{HEAD_CELL}">Exam</th>
        <th style="{HEAD_CELL}">Internal</th>
        <th style="{HEAD_CELL}">Total</th>
      </tr>
      {rows}
    </table>
    <div style="margin-top: 20px;">
      <p><b>Attendance:</b> {attendance} | <b>Internship:</b> {internship} | <b>Project:</b> {project}</p>
      <h2 style="text-align: right;">Total: {grand_total}</h2>
      <h2 style="text-align: right; color: {color};">RESULT: {verdict} ({percentage:.2}%)</h2>
    </div>
    <hr>
    <p style="text-align: center; font-size: 12px; color: #777;">Computer Generated Report - {institution}</p>
  </div>
</body>
</html>"#,
        institution_upper = institution.to_uppercase(),
        department = escape_html(&record.department),
        name = escape_html(&record.student_name),
        enrollment = escape_html(&record.enrollment_number),
        course = escape_html(&record.course),
        semester = escape_html(&record.semester),
        attendance = format_mark(record.attendance),
        internship = format_mark(record.internship),
        project = format_mark(record.project),
        grand_total = format_mark(aggregate.grand_total),
        color = verdict_color(aggregate.verdict),
        verdict = aggregate.verdict.as_str(),
        percentage = aggregate.percentage,
    )
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Turns marksheet markup into a final document.
pub trait DocumentRenderer {
    fn render(&self, markup: &str) -> ResultsResult<RenderedDocument>;
}

/// Emits the markup itself as a standalone HTML document.
pub struct HtmlDocumentRenderer;

impl DocumentRenderer for HtmlDocumentRenderer {
    fn render(&self, markup: &str) -> ResultsResult<RenderedDocument> {
        Ok(RenderedDocument {
            bytes: markup.as_bytes().to_vec(),
            content_type: "text/html; charset=utf-8",
            extension: "html",
        })
    }
}

pub fn document_file_name(record: &StudentRecord, extension: &str) -> String {
    let stem: String = record
        .student_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();
    format!("{}_Marksheet.{}", stem.trim(), extension)
}
