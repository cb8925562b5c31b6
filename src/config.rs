use std::env;
use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "BULLETIND_WORKSPACE";
pub const LOG_ENV: &str = "BULLETIND_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

/// Process-level configuration, read once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workspace = non_empty(WORKSPACE_ENV).map(PathBuf::from);
        let log_filter = non_empty(LOG_ENV)
            .or_else(|| non_empty("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            workspace,
            log_filter,
        }
    }
}
