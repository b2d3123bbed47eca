use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_f64, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::stats::{percentage, GradeBands, MarkStat};
use crate::store;
use crate::upload::UploadError;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::setup::grade_bands;

/// Every recorded mark joined with its student and assignment, optionally
/// restricted to one class and a search needle.
pub fn load_mark_stats(
    conn: &Connection,
    bands: &GradeBands,
    class_id: Option<&str>,
    search: Option<&str>,
) -> rusqlite::Result<Vec<MarkStat>> {
    let mut stmt = conn.prepare(
        "SELECT
           m.id,
           s.student_id,
           COALESCE(NULLIF(TRIM(s.name), ''), 'Student ' || s.student_id),
           a.class_id,
           a.id,
           a.title,
           m.marks_obtained,
           a.max_marks
         FROM marks m
         JOIN students s ON s.id = m.student_id
         JOIN assignments a ON a.id = m.assignment_id
         WHERE (?1 IS NULL OR a.class_id = ?1)
         ORDER BY m.submission_date DESC, s.student_id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let marks_obtained: f64 = r.get(6)?;
            let max_marks: f64 = r.get(7)?;
            let pct = percentage(marks_obtained, max_marks);
            Ok(MarkStat {
                mark_id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                class_id: r.get(3)?,
                assignment_id: r.get(4)?,
                assignment_title: r.get(5)?,
                marks_obtained,
                max_marks,
                percentage: pct,
                grade: bands.grade(pct),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match search {
        Some(needle) => rows.into_iter().filter(|m| m.matches_search(needle)).collect(),
        None => rows,
    })
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "marks": [] }));
    };
    let class_id = get_opt_str(&req.params, "classId");
    let search = get_opt_str(&req.params, "search");

    let bands = match grade_bands(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match load_mark_stats(conn, &bands, class_id.as_deref(), search.as_deref()) {
        Ok(marks) => ok(&req.id, json!({ "marks": marks })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn upsert_checked(
    conn: &Connection,
    student_code: &str,
    assignment_id: &str,
    marks_obtained: f64,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment = store::assignment_ref(conn, assignment_id)?;
    let max = assignment.max_marks();
    if !(0.0..=max).contains(&marks_obtained) {
        return Err(HandlerErr::new(
            "bad_params",
            format!("Invalid marks (0-{} allowed)", max),
        )
        .with_details(json!({ "marksObtained": marks_obtained, "maxMarks": max })));
    }

    let student: Option<(String, String)> = conn
        .query_row(
            "SELECT id, class_id FROM students WHERE student_id = ?",
            [student_code],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(UploadError::store)?;
    let Some((row_id, class_id)) = student else {
        return Err(HandlerErr::new("not_found", "Student not found")
            .with_details(json!({ "studentId": student_code })));
    };
    if class_id != assignment.class_id() {
        return Err(HandlerErr::new(
            "bad_params",
            format!("Student not in {}", assignment.class_label()),
        ));
    }

    store::upsert_mark(conn, &row_id, assignment.id(), marks_obtained)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({
        "studentId": student_code,
        "assignmentId": assignment.id(),
        "marksObtained": marks_obtained,
        "percentage": percentage(marks_obtained, max)
    }))
}

fn handle_marks_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_code = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let assignment_id = match get_required_str(&req.params, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let marks_obtained = match get_required_f64(&req.params, "marksObtained") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match upsert_checked(conn, &student_code, &assignment_id, marks_obtained) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mark_id = match get_required_str(&req.params, "markId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match conn.execute("DELETE FROM marks WHERE id = ?", [&mark_id]) {
        Ok(0) => err(&req.id, "not_found", "mark not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.upsert" => Some(handle_marks_upsert(state, req)),
        "marks.delete" => Some(handle_marks_delete(state, req)),
        _ => None,
    }
}
