use std::path::PathBuf;

/// Process-level configuration read from the environment at startup.
/// Workspace-level settings live in the `settings` table instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
    /// `tracing` filter directive for stderr logging.
    pub log_filter: String,
    /// Actor recorded on audit entries when a request names none.
    pub default_actor: String,
    /// Fixed delay slept before each reconciliation pass.
    pub processing_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: "info".to_string(),
            default_actor: "Admin User".to_string(),
            processing_delay_ms: 0,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        Self {
            workspace: get("TRACKERD_WORKSPACE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            log_filter: get("TRACKERD_LOG").unwrap_or(default.log_filter),
            default_actor: get("TRACKERD_ACTOR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default.default_actor),
            processing_delay_ms: get("TRACKERD_PROCESSING_DELAY_MS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default.processing_delay_ms),
        }
    }
}
