use super::{
    AssignmentRef, ExistingMarks, OutcomeStatus, ParsedRow, Roster, RosterMatch, RowOutcome,
};

const UNKNOWN_STUDENT: &str = "Unknown";

fn rejected(row: &ParsedRow, name: String, message: String) -> RowOutcome {
    RowOutcome {
        line: row.line,
        student_id: row.student_id.clone(),
        student_name: name,
        marks: row.marks,
        status: OutcomeStatus::Rejected,
        previous_marks: None,
        message: Some(message),
    }
}

fn classify(
    row: &ParsedRow,
    assignment: &AssignmentRef,
    roster: &Roster,
    existing: &ExistingMarks,
) -> RowOutcome {
    let student = match roster.lookup(&row.student_id) {
        RosterMatch::One(s) => s,
        RosterMatch::Missing => {
            return rejected(row, UNKNOWN_STUDENT.into(), "Student not found".into())
        }
        RosterMatch::Ambiguous => {
            return rejected(
                row,
                UNKNOWN_STUDENT.into(),
                "Student ID matches multiple students".into(),
            )
        }
    };
    let name = student.display_name();

    if student.class_id != assignment.class_id() {
        return rejected(
            row,
            name,
            format!("Student not in {}", assignment.class_label()),
        );
    }

    let max = assignment.max_marks();
    if !(0.0..=max).contains(&row.marks) {
        return rejected(row, name, format!("Invalid marks (0-{} allowed)", max));
    }

    let previous_marks = existing.get(&row.student_id, assignment.id());
    let status = if previous_marks.is_some() {
        OutcomeStatus::Replacing
    } else {
        OutcomeStatus::New
    };

    RowOutcome {
        line: row.line,
        student_id: row.student_id.clone(),
        student_name: name,
        marks: row.marks,
        status,
        previous_marks,
        message: None,
    }
}

/// Classify every parsed row. Output length and order match `rows`; checks run
/// roster → class → range → existing mark, and the first failure wins.
pub fn reconcile(
    rows: &[ParsedRow],
    assignment: &AssignmentRef,
    roster: &Roster,
    existing: &ExistingMarks,
) -> Vec<RowOutcome> {
    rows.iter()
        .map(|row| classify(row, assignment, roster, existing))
        .collect()
}
