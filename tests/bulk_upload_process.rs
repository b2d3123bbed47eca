mod test_support;

use serde_json::json;
use test_support::{
    error_code, open_workspace, request_err, request_ok, seed_grade_11, spawn_sidecar,
};

fn statuses(result: &serde_json::Value) -> Vec<(String, String)> {
    result["outcomes"]
        .as_array()
        .expect("outcomes")
        .iter()
        .map(|o| {
            (
                o["studentId"].as_str().unwrap_or("").to_string(),
                o["status"].as_str().unwrap_or("").to_string(),
            )
        })
        .collect()
}

#[test]
fn process_classifies_rows_without_writing_marks() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "trackerd-process");
    let seed = seed_grade_11(&mut stdin, &mut reader);

    let csv = "Student ID,Marks\nST001,45\nST002,40\nST003,30\nST999,20\nST001,60\nnot a row\n\nST004,abc\nST004,0\n";
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bulkUpload.process",
        json!({ "assignmentId": seed.assignment, "csv": csv, "actor": "Ms. Naidoo" }),
    );

    assert_eq!(
        statuses(&result),
        vec![
            ("ST001".to_string(), "new".to_string()),
            ("ST002".to_string(), "replacing".to_string()),
            ("ST003".to_string(), "rejected".to_string()),
            ("ST999".to_string(), "rejected".to_string()),
            ("ST001".to_string(), "rejected".to_string()),
            ("ST004".to_string(), "new".to_string()),
        ]
    );
    let outcomes = result["outcomes"].as_array().expect("outcomes");
    assert_eq!(outcomes[0]["studentName"], "John Doe");
    assert_eq!(outcomes[1]["previousMarks"], 35.0);
    assert_eq!(outcomes[2]["message"], "Student not in Grade 11A");
    assert_eq!(outcomes[3]["message"], "Student not found");
    assert_eq!(outcomes[3]["studentName"], "Unknown");
    assert_eq!(outcomes[4]["message"], "Invalid marks (0-50 allowed)");
    assert_eq!(outcomes[5]["studentName"], "Student ST004");
    assert_eq!(outcomes[5]["line"], 10);

    assert_eq!(result["added"], 2);
    assert_eq!(result["updated"], 1);
    assert_eq!(result["errors"], 3);
    assert_eq!(result["rowsProcessed"], 6);

    let audit = &result["auditEntry"];
    assert_eq!(audit["action"], "Bulk Upload");
    assert_eq!(audit["actor"], "Ms. Naidoo");
    assert_eq!(audit["assignmentTitle"], "Mathematics Quiz 1");
    assert_eq!(audit["recordsProcessed"], 6);

    // Only the seeded mark exists; the pass is a preview.
    let marks = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "marks.list",
        json!({ "classId": seed.class_a }),
    );
    let marks = marks["marks"].as_array().expect("marks");
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0]["studentId"], "ST002");
    assert_eq!(marks[0]["marksObtained"], 35.0);
}

#[test]
fn header_only_upload_still_records_one_audit_entry() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "trackerd-process-empty");
    let seed = seed_grade_11(&mut stdin, &mut reader);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "bulkUpload.process",
        json!({ "assignmentId": seed.assignment, "csv": "Student ID,Marks\n" }),
    );
    assert_eq!(result["rowsProcessed"], 0);
    assert_eq!(result["auditEntry"]["actor"], "Admin User");

    let audit = request_ok(&mut stdin, &mut reader, "2", "audit.list", json!({}));
    let entries = audit["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["recordsProcessed"], 0);
    assert_eq!(entries[0]["details"]["headerMode"], "positional");
}

#[test]
fn pass_level_failures_leave_no_audit_entry() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "trackerd-process-errors");
    let seed = seed_grade_11(&mut stdin, &mut reader);

    for (i, params) in [
        json!({ "assignmentId": seed.assignment, "csv": "   \n\t" }),
        json!({ "assignmentId": seed.assignment }),
        json!({ "csv": "ST001,40" }),
        json!({ "assignmentId": "", "csv": "ST001,40" }),
    ]
    .into_iter()
    .enumerate()
    {
        let e = request_err(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "bulkUpload.process",
            params,
        );
        assert_eq!(error_code(&e), "bad_params");
        assert_eq!(
            e["message"],
            "Please select an assignment and provide CSV data."
        );
    }

    let e = request_err(
        &mut stdin,
        &mut reader,
        "missing",
        "bulkUpload.process",
        json!({ "assignmentId": "no-such-assignment", "csv": "ST001,40" }),
    );
    assert_eq!(error_code(&e), "not_found");

    let audit = request_ok(&mut stdin, &mut reader, "audit", "audit.list", json!({}));
    assert_eq!(audit["entries"].as_array().map(|a| a.len()), Some(0));
}

#[test]
fn process_requires_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "bulkUpload.process",
        json!({ "assignmentId": "a1", "csv": "ST001,40" }),
    );
    assert_eq!(error_code(&e), "no_workspace");
}

#[test]
fn audit_list_is_newest_first_and_honours_limit() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_workspace(&mut stdin, &mut reader, "trackerd-audit-order");
    let seed = seed_grade_11(&mut stdin, &mut reader);

    for (i, csv) in ["x\nST001,10", "x\nST001,20\nST002,30", "x\nST001,1\nST002,2\nST004,3"]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "bulkUpload.process",
            json!({ "assignmentId": seed.assignment, "csv": csv }),
        );
    }

    let all = request_ok(&mut stdin, &mut reader, "a", "audit.list", json!({}));
    let counts: Vec<i64> = all["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .filter_map(|e| e["recordsProcessed"].as_i64())
        .collect();
    assert_eq!(counts, vec![3, 2, 1]);

    let limited = request_ok(&mut stdin, &mut reader, "b", "audit.list", json!({ "limit": 2 }));
    assert_eq!(limited["entries"].as_array().map(|a| a.len()), Some(2));

    let e = request_err(&mut stdin, &mut reader, "c", "audit.list", json!({ "limit": 0 }));
    assert_eq!(error_code(&e), "bad_params");
}
