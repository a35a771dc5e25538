//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable that overrides the policy file location.
pub const POLICY_PATH_ENV: &str = "MICGUARD_POLICY";

pub const POLICY_FILE_NAME: &str = "micguard.json";
pub const LOG_FILE_NAME: &str = "micguard.log";

/// Where the application keeps its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// JSON policy file
    pub policy_path: PathBuf,

    /// Log file, next to the policy file
    pub log_path: PathBuf,
}

impl AppConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let exe = std::env::current_exe().context("cannot resolve executable path")?;
        let exe_dir = exe
            .parent()
            .context("executable path has no parent directory")?;
        let override_path = std::env::var_os(POLICY_PATH_ENV).map(PathBuf::from);

        Ok(Self::from_parts(override_path, exe_dir))
    }

    /// Resolve paths from an optional override and the executable directory.
    pub fn from_parts(policy_override: Option<PathBuf>, exe_dir: &Path) -> Self {
        let policy_path = policy_override
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| exe_dir.join(POLICY_FILE_NAME));

        let log_path = match policy_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(LOG_FILE_NAME),
            _ => PathBuf::from(LOG_FILE_NAME),
        };

        Self {
            policy_path,
            log_path,
        }
    }
}
