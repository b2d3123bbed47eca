use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_f64, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::now_ts;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn parse_max_marks(v: f64) -> Result<f64, HandlerErr> {
    if v > 0.0 {
        Ok(v)
    } else {
        Err(HandlerErr::new("bad_params", "maxMarks must be > 0")
            .with_details(json!({ "maxMarks": v })))
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "assignments": [] }));
    };
    let class_id = get_opt_str(&req.params, "classId");

    let mut stmt = match conn.prepare(
        "SELECT
           a.id,
           a.title,
           a.description,
           a.class_id,
           COALESCE(c.class_name, ''),
           a.max_marks,
           a.due_date,
           a.created_at,
           (SELECT COUNT(*) FROM marks m WHERE m.assignment_id = a.id) AS mark_count
         FROM assignments a
         LEFT JOIN classes c ON c.id = a.class_id
         WHERE (?1 IS NULL OR a.class_id = ?1)
         ORDER BY a.created_at DESC, a.title",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let description: Option<String> = row.get(2)?;
            let class_id: String = row.get(3)?;
            let class_name: String = row.get(4)?;
            let max_marks: f64 = row.get(5)?;
            let due_date: Option<String> = row.get(6)?;
            let created_at: String = row.get(7)?;
            let mark_count: i64 = row.get(8)?;
            Ok(json!({
                "id": id,
                "title": title,
                "description": description,
                "classId": class_id,
                "className": class_name,
                "maxMarks": max_marks,
                "dueDate": due_date,
                "createdAt": created_at,
                "markCount": mark_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let title = match get_required_str(&req.params, "title") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let max_marks = match get_required_f64(&req.params, "maxMarks").and_then(parse_max_marks) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let description = get_opt_str(&req.params, "description");
    let due_date = get_opt_str(&req.params, "dueDate");

    let class_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if class_exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let assignment_id = Uuid::new_v4().to_string();
    let now = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, title, description, class_id, max_marks, due_date, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &title,
            &description,
            &class_id,
            max_marks,
            &due_date,
            &now,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    ok(
        &req.id,
        json!({
            "assignmentId": assignment_id,
            "title": title,
            "classId": class_id,
            "maxMarks": max_marks
        }),
    )
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let assignment_id = match get_required_str(&req.params, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let title = get_opt_str(&req.params, "title");
    let description = get_opt_str(&req.params, "description");
    let due_date = get_opt_str(&req.params, "dueDate");
    let max_marks = match req.params.get("maxMarks") {
        None | Some(serde_json::Value::Null) => None,
        Some(_) => match get_required_f64(&req.params, "maxMarks").and_then(parse_max_marks) {
            Ok(v) => Some(v),
            Err(e) => return e.response(&req.id),
        },
    };
    if title.is_none() && description.is_none() && due_date.is_none() && max_marks.is_none() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    let changed = match conn.execute(
        "UPDATE assignments SET
           title = COALESCE(?, title),
           description = COALESCE(?, description),
           due_date = COALESCE(?, due_date),
           max_marks = COALESCE(?, max_marks),
           updated_at = ?
         WHERE id = ?",
        (
            &title,
            &description,
            &due_date,
            max_marks,
            now_ts(),
            &assignment_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "assignments" })),
            )
        }
    };
    if changed == 0 {
        return err(&req.id, "not_found", "assignment not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let assignment_id = match get_required_str(&req.params, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM marks WHERE assignment_id = ?", [&assignment_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }
    let deleted = match tx.execute("DELETE FROM assignments WHERE id = ?", [&assignment_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "assignments" })),
            );
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "assignment not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}
