//! SQLite-backed collaborators for the bulk upload pass: roster, assignment
//! and existing-mark snapshots, the audit log, and the marks writer used by
//! `bulkUpload.apply`.

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::upload::{
    AssignmentRef, AuditEntry, AuditSink, ExistingMarkRef, ExistingMarks, Roster, RosterEntry,
    RowOutcome, UploadError,
};

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn roster_snapshot(conn: &Connection) -> Result<Roster, UploadError> {
    let mut stmt = conn
        .prepare("SELECT student_id, name, class_id FROM students")
        .map_err(UploadError::store)?;
    let entries = stmt
        .query_map([], |r| {
            Ok(RosterEntry {
                student_id: r.get(0)?,
                name: r.get(1)?,
                class_id: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(UploadError::store)?;
    Ok(Roster::from_entries(entries))
}

pub fn assignment_ref(conn: &Connection, assignment_id: &str) -> Result<AssignmentRef, UploadError> {
    let row: Option<(String, String, String, f64)> = conn
        .query_row(
            "SELECT a.title, a.class_id, COALESCE(c.class_name, ''), a.max_marks
             FROM assignments a
             LEFT JOIN classes c ON c.id = a.class_id
             WHERE a.id = ?",
            [assignment_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(UploadError::store)?;
    let Some((title, class_id, class_name, max_marks)) = row else {
        return Err(UploadError::AssignmentNotFound(assignment_id.to_string()));
    };
    AssignmentRef::new(assignment_id, title, class_id, class_name, max_marks)
}

pub fn existing_marks(conn: &Connection, assignment_id: &str) -> Result<ExistingMarks, UploadError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.student_id, m.assignment_id, m.marks_obtained
             FROM marks m
             JOIN students s ON s.id = m.student_id
             WHERE m.assignment_id = ?",
        )
        .map_err(UploadError::store)?;
    let refs = stmt
        .query_map([assignment_id], |r| {
            Ok(ExistingMarkRef {
                student_id: r.get(0)?,
                assignment_id: r.get(1)?,
                marks: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(UploadError::store)?;
    Ok(ExistingMarks::from_refs(refs))
}

pub struct SqliteAuditLog<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAuditLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AuditSink for SqliteAuditLog<'_> {
    fn append(&mut self, entry: &AuditEntry) -> Result<(), UploadError> {
        self.conn
            .execute(
                "INSERT INTO audit_logs(
                    id, created_at, performed_by, action, entity_type, entity_id,
                    entity_title, records_processed, details
                 ) VALUES(?, ?, ?, ?, 'assignment', ?, ?, ?, ?)",
                (
                    &entry.id,
                    &entry.timestamp,
                    &entry.actor,
                    &entry.action,
                    &entry.assignment_id,
                    &entry.assignment_title,
                    entry.records_processed as i64,
                    entry.details.to_string(),
                ),
            )
            .map_err(|e| UploadError::Audit(e.to_string()))?;
        Ok(())
    }
}

/// Audit entries, newest first.
pub fn list_audit(conn: &Connection, limit: i64) -> anyhow::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, COALESCE(performed_by, ''), action, COALESCE(entity_id, ''),
                COALESCE(entity_title, ''), records_processed, details
         FROM audit_logs
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |r| {
            let details: String = r.get(7)?;
            Ok(AuditEntry {
                id: r.get(0)?,
                timestamp: r.get(1)?,
                actor: r.get(2)?,
                action: r.get(3)?,
                assignment_id: r.get(4)?,
                assignment_title: r.get(5)?,
                records_processed: r.get::<_, i64>(6)?.max(0) as usize,
                details: serde_json::from_str(&details).unwrap_or(Value::Null),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert or update a single mark keyed by (student row id, assignment id).
pub fn upsert_mark(
    conn: &Connection,
    student_row_id: &str,
    assignment_id: &str,
    marks_obtained: f64,
) -> rusqlite::Result<()> {
    let now = now_ts();
    conn.execute(
        "INSERT INTO marks(id, student_id, assignment_id, marks_obtained, submission_date, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, assignment_id) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            student_row_id,
            assignment_id,
            marks_obtained,
            &now,
            &now,
            &now,
        ),
    )?;
    Ok(())
}

/// Write every accepted outcome of a pass. Rejected rows are skipped; when a
/// student appears more than once the later row wins.
pub fn apply_outcomes(
    conn: &Connection,
    assignment_id: &str,
    outcomes: &[RowOutcome],
) -> Result<usize, UploadError> {
    let mut stmt = conn
        .prepare("SELECT student_id, id FROM students")
        .map_err(UploadError::store)?;
    let row_ids: HashMap<String, String> = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(UploadError::store)?;

    let mut written = 0usize;
    for o in outcomes.iter().filter(|o| o.is_accepted()) {
        let Some(row_id) = row_ids.get(&o.student_id) else {
            continue;
        };
        upsert_mark(conn, row_id, assignment_id, o.marks).map_err(UploadError::store)?;
        written += 1;
    }
    Ok(written)
}
