use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::now_ts;
use crate::upload::RosterEntry;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn student_code_taken(
    conn: &Connection,
    student_code: &str,
    except_row_id: Option<&str>,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM students WHERE student_id = ? AND id <> COALESCE(?, '')",
        (student_code, except_row_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let class_id = get_opt_str(&req.params, "classId");
    let search = get_opt_str(&req.params, "search").map(|s| s.to_lowercase());

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.student_id, s.name, s.class_id, COALESCE(c.class_name, ''), s.created_at
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE (?1 IS NULL OR s.class_id = ?1)
         ORDER BY s.student_id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let name: Option<String> = row.get(2)?;
            let class_id: String = row.get(3)?;
            let class_name: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            let display_name = RosterEntry {
                student_id: student_id.clone(),
                name: name.clone(),
                class_id: class_id.clone(),
            }
            .display_name();
            Ok((
                display_name.to_lowercase(),
                student_id.to_lowercase(),
                json!({
                    "id": id,
                    "studentId": student_id,
                    "name": name,
                    "displayName": display_name,
                    "classId": class_id,
                    "className": class_name,
                    "createdAt": created_at
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(name, code, _)| match &search {
            Some(needle) => name.contains(needle) || code.contains(needle),
            None => true,
        })
        .map(|(_, _, v)| v)
        .collect();

    ok(&req.id, json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_code = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match get_required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = get_opt_str(&req.params, "name");

    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }
    match student_code_taken(conn, &student_code, None) {
        Ok(false) => {}
        Ok(true) => {
            return err(
                &req.id,
                "duplicate_student_id",
                format!("student id already exists: {}", student_code),
                Some(json!({ "studentId": student_code })),
            )
        }
        Err(e) => return e.response(&req.id),
    }

    let row_id = Uuid::new_v4().to_string();
    let now = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, student_id, name, class_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&row_id, &student_code, &name, &class_id, &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({ "id": row_id, "studentId": student_code, "classId": class_id }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let row_id = match get_required_str(&req.params, "id") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_code = get_opt_str(&req.params, "studentId");
    // Absent keeps the name; null or blank clears it.
    let name: Option<Option<String>> = match req.params.get("name") {
        None => None,
        Some(serde_json::Value::Null) => Some(None),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            Some((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => return err(&req.id, "bad_params", "name must be a string or null", None),
    };
    let class_id = get_opt_str(&req.params, "classId");
    if student_code.is_none() && name.is_none() && class_id.is_none() {
        return err(&req.id, "bad_params", "nothing to update", None);
    }

    if let Some(cid) = class_id.as_deref() {
        match class_exists(conn, cid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return e.response(&req.id),
        }
    }
    if let Some(code) = student_code.as_deref() {
        match student_code_taken(conn, code, Some(&row_id)) {
            Ok(false) => {}
            Ok(true) => {
                return err(
                    &req.id,
                    "duplicate_student_id",
                    format!("student id already exists: {}", code),
                    Some(json!({ "studentId": code })),
                )
            }
            Err(e) => return e.response(&req.id),
        }
    }

    let changed = match conn.execute(
        "UPDATE students SET
           student_id = COALESCE(?, student_id),
           name = CASE WHEN ? THEN ? ELSE name END,
           class_id = COALESCE(?, class_id),
           updated_at = ?
         WHERE id = ?",
        (
            &student_code,
            name.is_some(),
            name.as_ref().and_then(|n| n.as_deref()),
            &class_id,
            now_ts(),
            &row_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        }
    };
    if changed == 0 {
        return err(&req.id, "not_found", "student not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let row_id = match get_required_str(&req.params, "id") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("DELETE FROM marks WHERE student_id = ?", [&row_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }
    let deleted = match tx.execute("DELETE FROM students WHERE id = ?", [&row_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            );
        }
    };
    if deleted == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "student not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
