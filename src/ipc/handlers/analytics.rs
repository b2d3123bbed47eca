use crate::ipc::error::{err, ok};
use crate::ipc::helpers::get_opt_str;
use crate::ipc::types::{AppState, Request};
use crate::stats::{average, grade_distribution, top_performers};
use rusqlite::Connection;
use serde_json::json;

use super::marks::load_mark_stats;
use super::setup::grade_bands;

const TOP_PERFORMERS: usize = 3;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
}

fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let mut totals = [0i64; 3];
    for (slot, table) in totals.iter_mut().zip(["classes", "students", "assignments"]) {
        *slot = match count(conn, table) {
            Ok(n) => n,
            Err(e) => {
                return err(
                    &req.id,
                    "db_query_failed",
                    e.to_string(),
                    Some(json!({ "table": table })),
                )
            }
        };
    }

    let bands = match grade_bands(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let marks = match load_mark_stats(conn, &bands, None, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "totalClasses": totals[0],
            "totalStudents": totals[1],
            "totalAssignments": totals[2],
            "totalMarks": marks.len(),
            "averagePerformance": average(marks.iter().map(|m| m.percentage))
        }),
    )
}

fn handle_performance_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = get_opt_str(&req.params, "classId");
    let search = get_opt_str(&req.params, "search");

    let bands = match grade_bands(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let marks = match load_mark_stats(conn, &bands, class_id.as_deref(), search.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let distribution: Vec<serde_json::Value> = grade_distribution(&marks)
        .into_iter()
        .map(|(grade, count)| json!({ "grade": grade, "count": count }))
        .collect();

    ok(
        &req.id,
        json!({
            "marks": marks,
            "averagePerformance": average(marks.iter().map(|m| m.percentage)),
            "topPerformers": top_performers(&marks, TOP_PERFORMERS),
            "gradeDistribution": distribution
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.stats" => Some(handle_dashboard_stats(state, req)),
        "performance.summary" => Some(handle_performance_summary(state, req)),
        _ => None,
    }
}
