use chrono::{SecondsFormat, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use super::{
    parse_rows, reconcile, AssignmentRef, AuditEntry, AuditSink, ExistingMarks, HeaderMode,
    OutcomeStatus, Roster, RowOutcome, UploadError,
};

pub const ACTION_BULK_UPLOAD: &str = "Bulk Upload";
pub const ACTION_BULK_APPLY: &str = "Bulk Upload Applied";

#[derive(Debug, Clone)]
pub struct PassReport {
    pub outcomes: Vec<RowOutcome>,
    pub audit: AuditEntry,
}

impl PassReport {
    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn added(&self) -> usize {
        self.count(OutcomeStatus::New)
    }

    pub fn updated(&self) -> usize {
        self.count(OutcomeStatus::Replacing)
    }

    pub fn errors(&self) -> usize {
        self.count(OutcomeStatus::Rejected)
    }
}

/// Pass-level precondition: an assignment must be selected and the text must
/// not be blank. Checked before anything is loaded or parsed.
pub fn require_pass_input<'a>(
    assignment_id: Option<&'a str>,
    text: Option<&'a str>,
) -> Result<(&'a str, &'a str), UploadError> {
    let assignment_id = assignment_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(UploadError::MissingInput)?;
    let text = text
        .filter(|s| !s.trim().is_empty())
        .ok_or(UploadError::MissingInput)?;
    Ok((assignment_id, text))
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Snapshots taken at the start of a pass, plus how to read the header line.
#[derive(Debug, Clone, Copy)]
pub struct PassInput<'a> {
    pub assignment: &'a AssignmentRef,
    pub roster: &'a Roster,
    pub existing: &'a ExistingMarks,
    pub header_mode: HeaderMode,
}

/// One reconciliation pass: parse, classify against the snapshots, then
/// append exactly one audit entry. Nothing is written to the marks store.
pub fn run_pass(
    input: &PassInput<'_>,
    text: &str,
    actor: &str,
    action: &str,
    sink: &mut dyn AuditSink,
) -> Result<PassReport, UploadError> {
    let PassInput {
        assignment,
        roster,
        existing,
        header_mode,
    } = *input;
    if text.trim().is_empty() {
        return Err(UploadError::MissingInput);
    }

    let rows = parse_rows(text, header_mode);
    let outcomes = reconcile(&rows, assignment, roster, existing);

    let audit = AuditEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        actor: actor.to_string(),
        assignment_id: assignment.id().to_string(),
        assignment_title: assignment.title().to_string(),
        action: action.to_string(),
        records_processed: outcomes.len(),
        details: serde_json::Value::Null,
    };
    let mut report = PassReport { outcomes, audit };
    report.audit.details = json!({
        "added": report.added(),
        "updated": report.updated(),
        "errors": report.errors(),
        "headerMode": header_mode.as_str(),
        "inputSha256": sha256_hex(text),
    });

    sink.append(&report.audit)?;

    info!(
        assignment_id = assignment.id(),
        roster_size = roster.len(),
        rows = report.outcomes.len(),
        added = report.added(),
        updated = report.updated(),
        errors = report.errors(),
        action,
        "bulk upload pass complete"
    );

    Ok(report)
}
