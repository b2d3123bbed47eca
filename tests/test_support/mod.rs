#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(env: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_trackerd");
    let mut cmd = Command::new(exe);
    cmd.env_remove("TRACKERD_WORKSPACE")
        .env_remove("TRACKERD_ACTOR")
        .env_remove("TRACKERD_PROCESSING_DELAY_MS");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn trackerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

/// Send a request that must fail; returns the `error` object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_default()
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

/// Ids created by [`seed_grade_11`].
pub struct Seed {
    pub class_a: String,
    pub class_b: String,
    pub assignment: String,
}

/// Two classes, four students and a 50-mark quiz in Grade 11A. ST002 already
/// holds 35 on the quiz.
pub fn seed_grade_11(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> Seed {
    let class_a = request_ok(
        stdin,
        reader,
        "seed-c1",
        "classes.create",
        json!({ "className": "Grade 11A" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let class_b = request_ok(
        stdin,
        reader,
        "seed-c2",
        "classes.create",
        json!({ "className": "Grade 11B", "shift": "Part-time" }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();

    let students = [
        ("ST001", Some("John Doe"), &class_a),
        ("ST002", Some("Jane Smith"), &class_a),
        ("ST003", Some("Mike Johnson"), &class_b),
        ("ST004", None, &class_a),
    ];
    for (i, (code, name, class_id)) in students.iter().enumerate() {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed-s{}", i),
            "students.create",
            json!({ "studentId": code, "name": name, "classId": class_id }),
        );
    }

    let assignment = request_ok(
        stdin,
        reader,
        "seed-a1",
        "assignments.create",
        json!({ "title": "Mathematics Quiz 1", "classId": class_a, "maxMarks": 50 }),
    )["assignmentId"]
        .as_str()
        .expect("assignmentId")
        .to_string();

    let _ = request_ok(
        stdin,
        reader,
        "seed-m1",
        "marks.upsert",
        json!({ "studentId": "ST002", "assignmentId": assignment, "marksObtained": 35 }),
    );

    Seed {
        class_a,
        class_b,
        assignment,
    }
}

pub fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}
