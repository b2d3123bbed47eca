use super::AssignmentRef;

pub const TEMPLATE_HEADER: &str = "Student ID,Marks";
const TEMPLATE_EXAMPLE_ROWS: [(&str, u32); 3] = [("ST001", 85), ("ST002", 92), ("ST003", 78)];

/// Illustrative upload template. The example rows are placeholders and do not
/// depend on the assignment's roster.
pub fn template_csv(_assignment: &AssignmentRef) -> String {
    let mut lines = vec![TEMPLATE_HEADER.to_string()];
    for (id, marks) in TEMPLATE_EXAMPLE_ROWS {
        lines.push(format!("{id},{marks}"));
    }
    lines.join("\n")
}

pub fn template_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len() + 13);
    let mut in_space = false;
    for ch in title.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.push_str("_template.csv");
    out
}
