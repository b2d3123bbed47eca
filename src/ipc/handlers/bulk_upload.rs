use crate::config::Config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_opt_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SqliteAuditLog};
use crate::upload::{
    require_pass_input, run_pass, template_csv, template_filename, PassInput, PassReport,
    UploadError, ACTION_BULK_APPLY, ACTION_BULK_UPLOAD,
};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::setup::bulk_upload_settings;

fn handle_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let assignment_id = match get_required_str(&req.params, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let assignment = match store::assignment_ref(conn, &assignment_id) {
        Ok(v) => v,
        Err(e) => return HandlerErr::from(e).response(&req.id),
    };

    let filename = template_filename(assignment.title());
    let content = template_csv(&assignment);

    let Some(out_dir) = get_opt_str(&req.params, "outDir").map(PathBuf::from) else {
        return ok(
            &req.id,
            json!({ "filename": filename, "content": content, "path": null }),
        );
    };
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    let path = out_dir.join(&filename);
    if let Err(e) = std::fs::write(&path, &content) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        );
    }
    ok(
        &req.id,
        json!({
            "filename": filename,
            "content": content,
            "path": path.to_string_lossy()
        }),
    )
}

/// Load the snapshots for one assignment and run a single pass against
/// `conn`, appending the audit entry there too.
fn pass_on(
    conn: &Connection,
    config: &Config,
    params: &serde_json::Value,
    action: &str,
) -> Result<PassReport, HandlerErr> {
    let (assignment_id, text) = require_pass_input(
        params.get("assignmentId").and_then(|v| v.as_str()),
        params.get("csv").and_then(|v| v.as_str()),
    )?;
    let assignment = store::assignment_ref(conn, assignment_id)?;
    let settings = bulk_upload_settings(conn).map_err(UploadError::store)?;

    let actor = get_opt_str(params, "actor")
        .or(settings.default_actor)
        .unwrap_or_else(|| config.default_actor.clone());
    let delay_ms = settings
        .processing_delay_ms
        .unwrap_or(config.processing_delay_ms);
    if delay_ms > 0 {
        std::thread::sleep(Duration::from_millis(delay_ms));
    }

    let roster = store::roster_snapshot(conn)?;
    let existing = store::existing_marks(conn, assignment.id())?;
    let mut sink = SqliteAuditLog::new(conn);
    let input = PassInput {
        assignment: &assignment,
        roster: &roster,
        existing: &existing,
        header_mode: settings.header_mode,
    };
    let report = run_pass(&input, text, &actor, action, &mut sink)?;
    Ok(report)
}

fn report_json(report: &PassReport) -> serde_json::Value {
    json!({
        "outcomes": report.outcomes,
        "added": report.added(),
        "updated": report.updated(),
        "errors": report.errors(),
        "rowsProcessed": report.outcomes.len(),
        "auditEntry": report.audit
    })
}

fn handle_process(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match pass_on(conn, &state.config, &req.params, ACTION_BULK_UPLOAD) {
        Ok(report) => ok(&req.id, report_json(&report)),
        Err(e) => {
            warn!(code = e.code, error = %e.message, "bulk upload pass failed");
            e.response(&req.id)
        }
    }
}

fn handle_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let report = match pass_on(&tx, &state.config, &req.params, ACTION_BULK_APPLY) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            warn!(code = e.code, error = %e.message, "bulk upload apply failed");
            return e.response(&req.id);
        }
    };
    let written = match store::apply_outcomes(&tx, report.audit.assignment_id.as_str(), &report.outcomes) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return HandlerErr::from(e).response(&req.id);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    info!(
        assignment_id = report.audit.assignment_id.as_str(),
        written, "bulk upload applied"
    );

    let mut result = report_json(&report);
    result["written"] = json!(written);
    ok(&req.id, result)
}

fn handle_audit_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "entries": [] }));
    };
    let limit = match req.params.get("limit") {
        None | Some(serde_json::Value::Null) => 50,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=1000).contains(&n) => n,
            _ => return err(&req.id, "bad_params", "limit must be in 1..=1000", None),
        },
    };
    match store::list_audit(conn, limit) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulkUpload.template" => Some(handle_template(state, req)),
        "bulkUpload.process" => Some(handle_process(state, req)),
        "bulkUpload.apply" => Some(handle_apply(state, req)),
        "audit.list" => Some(handle_audit_list(state, req)),
        _ => None,
    }
}
