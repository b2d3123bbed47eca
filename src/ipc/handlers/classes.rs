use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::now_ts;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const SHIFTS: [&str; 2] = ["Full-time", "Part-time"];

fn parse_shift(raw: Option<String>) -> Result<Option<&'static str>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    SHIFTS
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(&raw))
        .map(Some)
        .ok_or_else(|| "shift must be one of: Full-time, Part-time".to_string())
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.class_name,
           c.shift,
           c.created_at,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM assignments a WHERE a.class_id = c.id) AS assignment_count
         FROM classes c
         ORDER BY c.class_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let class_name: String = row.get(1)?;
            let shift: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let assignment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "className": class_name,
                "shift": shift,
                "createdAt": created_at,
                "studentCount": student_count,
                "assignmentCount": assignment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_name = match get_required_str(&req.params, "className") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let shift = match parse_shift(get_opt_str(&req.params, "shift")) {
        Ok(v) => v.unwrap_or(SHIFTS[0]),
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let class_id = Uuid::new_v4().to_string();
    let now = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, class_name, shift, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        (&class_id, &class_name, shift, &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({ "classId": class_id, "className": class_name, "shift": shift }),
    )
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_name = get_opt_str(&req.params, "className");
    let shift = match parse_shift(get_opt_str(&req.params, "shift")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    if class_name.is_none() && shift.is_none() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    let changed = match conn.execute(
        "UPDATE classes SET
           class_name = COALESCE(?, class_name),
           shift = COALESCE(?, shift),
           updated_at = ?
         WHERE id = ?",
        (&class_name, shift, now_ts(), &class_id),
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "classes" })),
            )
        }
    };
    if changed == 0 {
        return err(&req.id, "not_found", "class not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    let steps: [(&str, &str); 4] = [
        (
            "marks",
            "DELETE FROM marks
             WHERE assignment_id IN (SELECT id FROM assignments WHERE class_id = ?1)
                OR student_id IN (SELECT id FROM students WHERE class_id = ?1)",
        ),
        ("assignments", "DELETE FROM assignments WHERE class_id = ?1"),
        ("students", "DELETE FROM students WHERE class_id = ?1"),
        ("classes", "DELETE FROM classes WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
