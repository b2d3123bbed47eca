mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_err, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("trackerd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("tracker.sqlite3").is_file());

    let methods = [
        "classes.list",
        "students.list",
        "assignments.list",
        "marks.list",
        "audit.list",
        "dashboard.stats",
        "performance.summary",
        "setup.get",
        "bulkUpload.template",
        "bulkUpload.process",
        "bulkUpload.apply",
        "classes.create",
        "students.create",
        "assignments.create",
        "marks.upsert",
    ];
    for (i, method) in methods.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("m{}", i), method, json!({}));
        if resp["ok"] == false {
            assert_ne!(error_code(&resp["error"]), "not_implemented", "{}", method);
        }
    }

    let e = request_err(&mut stdin, &mut reader, "x", "grades.explode", json!({}));
    assert_eq!(error_code(&e), "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["error"]["code"], "bad_json");

    drop(stdin);
    let status = child.wait().expect("wait for exit");
    assert!(status.success());
}

#[test]
fn startup_workspace_comes_from_environment() {
    let workspace = temp_dir("trackerd-env-workspace");
    let (_child, mut stdin, mut reader) = test_support::spawn_sidecar_with_env(&[(
        "TRACKERD_WORKSPACE",
        workspace.to_str().expect("utf8 path"),
    )]);
    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health["result"]["workspacePath"].as_str(),
        workspace.to_str()
    );
}
