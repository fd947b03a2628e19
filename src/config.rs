//! Run configuration.
//!
//! Everything is read from the environment so the tool can be run from CI
//! without a config file:
//! - `GITEA_BASE_URL`, `GITEA_TOKEN` - registry API (required)
//! - `MIGRATOR_SERVICE_USER` - account that opens the pull requests (default `altinn_sa_ai`)
//! - `MIGRATOR_BASE_BRANCH` - branch migrations start from (default `master`)
//! - `MIGRATOR_PAGE_SIZE` - registry page size (default `50`)
//! - `OPEN_AI_API_ENDPOINT`, `OPEN_API_KEY`, `OPEN_AI_API_VERSION`, `OPEN_AI_MODEL` - oracle deployment
//! - `MIGRATOR_ORACLE_TIMEOUT_SECS` - wall-clock bound on one oracle request (default `300`)
//! - `MIGRATOR_WORKSPACE`, `MIGRATOR_LEDGER` - local paths (default under the user data dir)

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MigrationError, Result};

const DEFAULT_SERVICE_USER: &str = "altinn_sa_ai";
const DEFAULT_BASE_BRANCH: &str = "master";
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
const DEFAULT_API_VERSION: &str = "2023-07-01-preview";
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 300;

/// Registry (Gitea) connection settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub token: String,
    pub service_user: String,
    pub base_branch: String,
    pub page_size: u32,
}

/// Oracle (Azure OpenAI deployment) connection settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MigratorConfig {
    pub registry: RegistryConfig,
    pub oracle: OracleConfig,
    /// Root directory; each repository is materialised under `<root>/<owner>/<name>`.
    pub workspace_root: PathBuf,
    pub ledger_path: PathBuf,
    /// Scan, consult and apply, but never commit, push or open a pull request.
    pub dry_run: bool,
}

impl MigratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, so tests don't have to touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| MigrationError::Config(format!("{} is not set", key)))
        };

        let page_size = match lookup("MIGRATOR_PAGE_SIZE") {
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                MigrationError::Config(format!("MIGRATOR_PAGE_SIZE is not a positive integer: {}", raw))
            })?,
            None => DEFAULT_PAGE_SIZE,
        };

        let timeout_secs = match lookup("MIGRATOR_ORACLE_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                MigrationError::Config(format!(
                    "MIGRATOR_ORACLE_TIMEOUT_SECS is not an integer: {}",
                    raw
                ))
            })?,
            None => DEFAULT_ORACLE_TIMEOUT_SECS,
        };

        let registry = RegistryConfig {
            base_url: required("GITEA_BASE_URL")?.trim_end_matches('/').to_string(),
            token: required("GITEA_TOKEN")?,
            service_user: lookup("MIGRATOR_SERVICE_USER")
                .unwrap_or_else(|| DEFAULT_SERVICE_USER.to_string()),
            base_branch: lookup("MIGRATOR_BASE_BRANCH")
                .unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string()),
            page_size,
        };

        let oracle = OracleConfig {
            endpoint: required("OPEN_AI_API_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required("OPEN_API_KEY")?,
            api_version: lookup("OPEN_AI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            model: lookup("OPEN_AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let workspace_root = match lookup("MIGRATOR_WORKSPACE") {
            Some(path) => PathBuf::from(path),
            None => default_data_dir()?.join("workspaces"),
        };
        let ledger_path = match lookup("MIGRATOR_LEDGER") {
            Some(path) => PathBuf::from(path),
            None => default_data_dir()?.join("ledger.db"),
        };

        Ok(Self {
            registry,
            oracle,
            workspace_root,
            ledger_path,
            dry_run: false,
        })
    }
}

/// Per-user data directory for the workspace and ledger.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "tracks-migrator")
        .ok_or_else(|| MigrationError::Config("Could not determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}
