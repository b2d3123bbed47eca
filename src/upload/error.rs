use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Please select an assignment and provide CSV data.")]
    MissingInput,
    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),
    #[error("assignment {assignment_id} has invalid max marks {max_marks}; must be > 0")]
    InvalidMaxMarks { assignment_id: String, max_marks: f64 },
    #[error("store error: {0}")]
    Store(String),
    #[error("audit append failed: {0}")]
    Audit(String),
}

impl UploadError {
    /// Stable code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput => "bad_params",
            Self::AssignmentNotFound(_) => "not_found",
            Self::InvalidMaxMarks { .. } => "invalid_max_marks",
            Self::Store(_) => "db_query_failed",
            Self::Audit(_) => "audit_failed",
        }
    }

    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }
}
