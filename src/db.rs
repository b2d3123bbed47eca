use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "tracker.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL,
            shift TEXT NOT NULL DEFAULT 'Full-time',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            name TEXT,
            class_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            class_id TEXT NOT NULL,
            max_marks REAL NOT NULL,
            due_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            marks_obtained REAL NOT NULL,
            submission_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            UNIQUE(student_id, assignment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_assignment ON marks(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_logs(
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            performed_by TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            details TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before per-entry titles/counts were tracked only had `details`.
    ensure_audit_logs_summary_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_audit_logs_summary_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "audit_logs", "entity_title")? {
        conn.execute("ALTER TABLE audit_logs ADD COLUMN entity_title TEXT", [])?;
    }
    if !table_has_column(conn, "audit_logs", "records_processed")? {
        conn.execute(
            "ALTER TABLE audit_logs ADD COLUMN records_processed INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("corrupt setting {}", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn open_is_idempotent_and_settings_round_trip() {
        let ws = temp_workspace("trackerd-db-open");
        {
            let conn = open_db(&ws).expect("open");
            assert!(table_has_column(&conn, "audit_logs", "records_processed").unwrap());
            assert_eq!(settings_get_json(&conn, "setup.bulkUpload").unwrap(), None);
            settings_set_json(&conn, "setup.bulkUpload", &json!({ "headerMode": "detect" }))
                .unwrap();
        }
        let conn = open_db(&ws).expect("reopen");
        assert_eq!(
            settings_get_json(&conn, "setup.bulkUpload").unwrap(),
            Some(json!({ "headerMode": "detect" }))
        );
    }

    #[test]
    fn old_audit_table_gains_summary_columns() {
        let ws = temp_workspace("trackerd-db-migrate");
        std::fs::create_dir_all(&ws).unwrap();
        {
            let conn = Connection::open(ws.join(DB_FILE_NAME)).unwrap();
            conn.execute(
                "CREATE TABLE audit_logs(
                    id TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    performed_by TEXT,
                    action TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT,
                    details TEXT NOT NULL
                )",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO audit_logs(id, created_at, action, entity_type, details)
                 VALUES('old', '2024-02-15T10:30:00Z', 'Bulk Upload', 'assignment', '{}')",
                [],
            )
            .unwrap();
        }
        let conn = open_db(&ws).expect("open migrates");
        let n: i64 = conn
            .query_row(
                "SELECT records_processed FROM audit_logs WHERE id = 'old'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 0);
    }
}
