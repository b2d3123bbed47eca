use serde::Serialize;
use std::cmp::Ordering;

/// Grade band thresholds in percent, checked from the top down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeBands {
    pub a_plus: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for GradeBands {
    fn default() -> Self {
        Self {
            a_plus: 90.0,
            a: 80.0,
            b: 70.0,
            c: 60.0,
        }
    }
}

pub const GRADE_LABELS: [&str; 5] = ["A+", "A", "B", "C", "F"];

impl GradeBands {
    pub fn from_json(v: &serde_json::Value) -> Self {
        let d = Self::default();
        let get = |k: &str, fallback: f64| v.get(k).and_then(|x| x.as_f64()).unwrap_or(fallback);
        Self {
            a_plus: get("aPlus", d.a_plus),
            a: get("a", d.a),
            b: get("b", d.b),
            c: get("c", d.c),
        }
    }

    pub fn grade(&self, percentage: f64) -> &'static str {
        if percentage >= self.a_plus {
            "A+"
        } else if percentage >= self.a {
            "A"
        } else if percentage >= self.b {
            "B"
        } else if percentage >= self.c {
            "C"
        } else {
            "F"
        }
    }
}

pub fn percentage(marks: f64, max_marks: f64) -> f64 {
    if max_marks > 0.0 {
        100.0 * marks / max_marks
    } else {
        0.0
    }
}

/// Mean of the given percentages; 0 when there are none.
pub fn average<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut n = 0usize;
    let mut sum = 0.0;
    for v in values {
        n += 1;
        sum += v;
    }
    if n > 0 {
        sum / n as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkStat {
    pub mark_id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub assignment_id: String,
    pub assignment_title: String,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub percentage: f64,
    pub grade: &'static str,
}

impl MarkStat {
    /// Case-insensitive match on student name, student id or assignment title.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.student_name.to_lowercase().contains(&needle)
            || self.student_id.to_lowercase().contains(&needle)
            || self.assignment_title.to_lowercase().contains(&needle)
    }
}

/// Highest percentages first; ties keep their input order.
pub fn top_performers(marks: &[MarkStat], n: usize) -> Vec<MarkStat> {
    let mut sorted = marks.to_vec();
    sorted.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}

pub fn grade_distribution(marks: &[MarkStat]) -> Vec<(&'static str, usize)> {
    GRADE_LABELS
        .iter()
        .map(|label| (*label, marks.iter().filter(|m| m.grade == *label).count()))
        .collect()
}
