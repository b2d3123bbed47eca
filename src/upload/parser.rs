use tracing::debug;

/// How the first non-empty line of an upload is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Always discard it, whatever it contains.
    #[default]
    Positional,
    /// Discard it only when its value field is not numeric.
    Detect,
}

impl HeaderMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Some(Self::Positional),
            "detect" => Some(Self::Detect),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::Detect => "detect",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based line number in the submitted text.
    pub line: usize,
    pub student_id: String,
    pub marks: f64,
}

fn split_record(line: &str) -> (&str, &str) {
    match line.split_once(',') {
        Some((id, value)) => (id.trim(), value.trim()),
        None => (line.trim(), ""),
    }
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Longest leading decimal literal: optional sign, then `Infinity` or
/// digits with an optional fraction and exponent. Trailing text is ignored.
fn numeric_prefix(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    if value[end..].starts_with("Infinity") {
        return Some(&value[..end + "Infinity".len()]);
    }

    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = count_digits(&bytes[exp..]);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }
    Some(&value[..end])
}

fn parse_marks(value: &str) -> Option<f64> {
    numeric_prefix(value)
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|v| !v.is_nan())
}

/// Parse `Student ID,Marks` text. Malformed lines are dropped without error.
pub fn parse_rows(text: &str, header_mode: HeaderMode) -> Vec<ParsedRow> {
    let mut rows = Vec::new();
    let mut header_seen = false;

    for (i, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let (student_id, value) = split_record(line);
        let marks = parse_marks(value);

        if !header_seen {
            header_seen = true;
            if header_mode == HeaderMode::Positional || marks.is_none() {
                continue;
            }
        }

        match marks {
            Some(marks) if !student_id.is_empty() => rows.push(ParsedRow {
                line: i + 1,
                student_id: student_id.to_string(),
                marks,
            }),
            _ => debug!(line = i + 1, "dropping malformed upload line"),
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(rows: &[ParsedRow]) -> Vec<&str> {
        rows.iter().map(|r| r.student_id.as_str()).collect()
    }

    #[test]
    fn empty_and_header_only_inputs_yield_nothing() {
        assert!(parse_rows("", HeaderMode::Positional).is_empty());
        assert!(parse_rows("   \n\n", HeaderMode::Positional).is_empty());
        assert!(parse_rows("Student ID,Marks\n", HeaderMode::Positional).is_empty());
    }

    #[test]
    fn first_non_empty_line_is_skipped_by_position() {
        // No header: the first data row is lost, which is the positional contract.
        let rows = parse_rows("\n\nST001,85\nST002,92", HeaderMode::Positional);
        assert_eq!(ids(&rows), vec!["ST002"]);
        assert_eq!(rows[0].line, 4);
    }

    #[test]
    fn detect_mode_keeps_numeric_first_line() {
        let rows = parse_rows("ST001,85\nST002,92", HeaderMode::Detect);
        assert_eq!(ids(&rows), vec!["ST001", "ST002"]);

        let rows = parse_rows("Student ID,Marks\nST001,85", HeaderMode::Detect);
        assert_eq!(ids(&rows), vec!["ST001"]);
    }

    #[test]
    fn malformed_lines_are_dropped_silently() {
        let text = "Student ID,Marks\nST001,abc\n,50\nST002\nST003, 77.5 \nST004,NaN";
        let rows = parse_rows(text, HeaderMode::Positional);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, "ST003");
        assert_eq!(rows[0].marks, 77.5);
    }

    #[test]
    fn extra_commas_stay_in_the_value_field() {
        let rows = parse_rows("h\nST001,85,extra\nST002,90", HeaderMode::Positional);
        assert_eq!(ids(&rows), vec!["ST001", "ST002"]);
        assert_eq!(rows[0].marks, 85.0);
    }

    #[test]
    fn value_is_read_from_its_leading_number() {
        let text = "Student ID,Marks\nST001,85,extra\nST002,92abc\nST003,inf";
        let rows = parse_rows(text, HeaderMode::Positional);
        assert_eq!(ids(&rows), vec!["ST001", "ST002"]);
        assert_eq!(rows[0].marks, 85.0);
        assert_eq!(rows[1].marks, 92.0);
    }

    #[test]
    fn numeric_prefix_follows_decimal_literal_rules() {
        assert_eq!(parse_marks("7.5kg"), Some(7.5));
        assert_eq!(parse_marks(".5"), Some(0.5));
        assert_eq!(parse_marks("5."), Some(5.0));
        assert_eq!(parse_marks("-3"), Some(-3.0));
        assert_eq!(parse_marks("1e2x"), Some(100.0));
        assert_eq!(parse_marks("4e"), Some(4.0));
        assert_eq!(parse_marks("2E+1"), Some(20.0));
        assert_eq!(parse_marks("Infinity"), Some(f64::INFINITY));
        assert_eq!(parse_marks("-Infinity"), Some(f64::NEG_INFINITY));
        for dropped in ["", "inf", "NaN", "-", ".", "+.e5", "abc", "infinity"] {
            assert_eq!(parse_marks(dropped), None, "{dropped:?}");
        }
    }

    #[test]
    fn order_and_duplicates_are_preserved() {
        let text = "Student ID,Marks\r\nST002,10\r\n\r\nST001,20\r\nST002,30\r\n";
        let rows = parse_rows(text, HeaderMode::Positional);
        assert_eq!(ids(&rows), vec!["ST002", "ST001", "ST002"]);
        assert_eq!(
            rows.iter().map(|r| r.marks).collect::<Vec<_>>(),
            vec![10.0, 20.0, 30.0]
        );
    }

    #[test]
    fn negative_and_out_of_range_values_still_parse() {
        let rows = parse_rows("h\nST001,-0.01\nST002,150", HeaderMode::Positional);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].marks, -0.01);
    }

    #[test]
    fn header_mode_round_trips_names() {
        assert_eq!(HeaderMode::parse("Detect"), Some(HeaderMode::Detect));
        assert_eq!(HeaderMode::parse("positional"), Some(HeaderMode::Positional));
        assert_eq!(HeaderMode::parse("sniff"), None);
        assert_eq!(HeaderMode::Detect.as_str(), "detect");
    }
}
