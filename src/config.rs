use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "SCHOOLD_WORKSPACE";
pub const LOG_ENV: &str = "SCHOOLD_LOG";

/// Process-level settings. Per-school settings live in the workspace database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workspace: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = lookup(WORKSPACE_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self { workspace }
    }
}
