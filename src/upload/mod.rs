//! Bulk marks ingestion: template generation, row parsing and reconciliation
//! against roster / assignment / existing-mark snapshots.

mod error;
mod parser;
mod pass;
mod reconcile;
mod template;

use serde::Serialize;
use std::collections::HashMap;

pub use error::UploadError;
pub use parser::{parse_rows, HeaderMode, ParsedRow};
pub use pass::{
    require_pass_input, run_pass, PassInput, PassReport, ACTION_BULK_APPLY, ACTION_BULK_UPLOAD,
};
pub use reconcile::reconcile;
pub use template::{template_csv, template_filename};

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student_id: String,
    pub name: Option<String>,
    pub class_id: String,
}

impl RosterEntry {
    /// Roster name when present, otherwise a synthesized `Student {id}` label.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("Student {}", self.student_id),
        }
    }
}

/// An assignment as seen by one reconciliation pass. The ceiling is
/// validated on construction so every range check downstream is meaningful.
#[derive(Debug, Clone)]
pub struct AssignmentRef {
    id: String,
    title: String,
    class_id: String,
    class_name: String,
    max_marks: f64,
}

impl AssignmentRef {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        class_id: impl Into<String>,
        class_name: impl Into<String>,
        max_marks: f64,
    ) -> Result<Self, UploadError> {
        let id = id.into();
        if !max_marks.is_finite() || max_marks <= 0.0 {
            return Err(UploadError::InvalidMaxMarks {
                assignment_id: id,
                max_marks,
            });
        }
        Ok(Self {
            id,
            title: title.into(),
            class_id: class_id.into(),
            class_name: class_name.into(),
            max_marks,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    /// Human label for the class, falling back to the key when unnamed.
    pub fn class_label(&self) -> &str {
        if self.class_name.trim().is_empty() {
            &self.class_id
        } else {
            &self.class_name
        }
    }

    pub fn max_marks(&self) -> f64 {
        self.max_marks
    }
}

#[derive(Debug, Clone)]
pub struct ExistingMarkRef {
    pub student_id: String,
    pub assignment_id: String,
    pub marks: f64,
}

pub enum RosterMatch<'a> {
    Missing,
    One(&'a RosterEntry),
    Ambiguous,
}

/// Snapshot of the student directory taken at the start of a pass.
#[derive(Debug, Default)]
pub struct Roster {
    by_student_id: HashMap<String, Vec<RosterEntry>>,
}

impl Roster {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = RosterEntry>,
    {
        let mut by_student_id: HashMap<String, Vec<RosterEntry>> = HashMap::new();
        for e in entries {
            by_student_id.entry(e.student_id.clone()).or_default().push(e);
        }
        Self { by_student_id }
    }

    pub fn lookup(&self, student_id: &str) -> RosterMatch<'_> {
        match self.by_student_id.get(student_id).map(|v| v.as_slice()) {
            None | Some([]) => RosterMatch::Missing,
            Some([one]) => RosterMatch::One(one),
            Some(_) => RosterMatch::Ambiguous,
        }
    }

    pub fn len(&self) -> usize {
        self.by_student_id.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
pub struct ExistingMarks {
    by_key: HashMap<(String, String), f64>,
}

impl ExistingMarks {
    pub fn from_refs<I>(refs: I) -> Self
    where
        I: IntoIterator<Item = ExistingMarkRef>,
    {
        Self {
            by_key: refs
                .into_iter()
                .map(|m| ((m.student_id, m.assignment_id), m.marks))
                .collect(),
        }
    }

    /// Previously recorded score for (student, assignment), if any.
    pub fn get(&self, student_id: &str, assignment_id: &str) -> Option<f64> {
        self.by_key
            .get(&(student_id.to_string(), assignment_id.to_string()))
            .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    New,
    Replacing,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub line: usize,
    pub student_id: String,
    pub student_name: String,
    pub marks: f64,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_marks: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RowOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status != OutcomeStatus::Rejected
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: String,
    pub actor: String,
    pub assignment_id: String,
    pub assignment_title: String,
    pub action: String,
    pub records_processed: usize,
    pub details: serde_json::Value,
}

/// Append-only destination for one entry per completed pass.
pub trait AuditSink {
    fn append(&mut self, entry: &AuditEntry) -> Result<(), UploadError>;
}

impl AuditSink for Vec<AuditEntry> {
    fn append(&mut self, entry: &AuditEntry) -> Result<(), UploadError> {
        self.push(entry.clone());
        Ok(())
    }
}
