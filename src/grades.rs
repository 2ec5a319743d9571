use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::StudentRecord;

/// Percentage ceiling contributed by each subject (exam + internal).
pub const SUBJECT_CEILING: f64 = 100.0;
/// Combined ceiling of attendance, internship and project marks.
pub const SUPPLEMENTARY_CEILING: f64 = 110.0;
pub const PASS_THRESHOLD_PERCENT: f64 = 40.0;

/// Interprets a raw mark. Anything that is not a finite, non-negative number
/// becomes 0 so that tolerant imports never fail on a bad cell.
pub fn coerce_mark(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(n)) => sanitize(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => coerce_mark_str(s),
        _ => 0.0,
    }
}

pub fn coerce_mark_str(raw: &str) -> f64 {
    sanitize(raw.trim().parse::<f64>().unwrap_or(0.0))
}

fn sanitize(v: f64) -> f64 {
    if !v.is_finite() || v <= 0.0 {
        // Also folds -0.0 into 0.0.
        return 0.0;
    }
    v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    name: String,
    exam: f64,
    internal: f64,
}

impl SubjectScore {
    pub fn new(name: impl Into<String>, exam: f64, internal: f64) -> Self {
        Self {
            name: name.into().trim().to_string(),
            exam: sanitize(exam),
            internal: sanitize(internal),
        }
    }

    /// Builds a subject from an API object `{name, exam, internal}`.
    pub fn from_value(v: &Value) -> Self {
        let name = match v.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Self::new(name, coerce_mark(v.get("exam")), coerce_mark(v.get("internal")))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exam(&self) -> f64 {
        self.exam
    }

    pub fn internal(&self) -> f64 {
        self.internal
    }

    pub fn subject_total(&self) -> f64 {
        self.exam + self.internal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub subject_count: usize,
    pub theory_total: f64,
    pub grand_total: f64,
    pub max_possible: f64,
    pub percentage: f64,
    pub verdict: Verdict,
}

pub fn aggregate(record: &StudentRecord) -> AggregateResult {
    aggregate_parts(
        &record.subjects,
        record.attendance,
        record.internship,
        record.project,
    )
}

pub fn aggregate_parts(
    subjects: &[SubjectScore],
    attendance: f64,
    internship: f64,
    project: f64,
) -> AggregateResult {
    let subject_count = subjects.len();
    let theory_total: f64 = subjects.iter().map(SubjectScore::subject_total).sum();
    let grand_total = theory_total + sanitize(attendance) + sanitize(internship) + sanitize(project);
    let max_possible = (subject_count as f64) * SUBJECT_CEILING + SUPPLEMENTARY_CEILING;
    let percentage = if subject_count > 0 {
        grand_total / max_possible * 100.0
    } else {
        0.0
    };
    let verdict = if percentage >= PASS_THRESHOLD_PERCENT {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    AggregateResult {
        subject_count,
        theory_total,
        grand_total,
        max_possible,
        percentage,
        verdict,
    }
}
