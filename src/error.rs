use std::path::PathBuf;

use thiserror::Error;

use crate::registry::RegistryError;

/// Everything that can abort the processing of a repository (or, for
/// `Registry` during discovery and `Config`, the whole run).
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("oracle request failed: {0}")]
    Oracle(String),

    #[error("oracle returned no instructions for {0} legacy file(s)")]
    OracleEmpty(usize),

    #[error("oracle did not answer within {0} seconds")]
    OracleTimeout(u64),

    #[error("invalid instruction for page '{page}': {reason}")]
    InvalidInstruction { page: String, reason: String },

    #[error("no layout file found for page '{0}'")]
    Unresolved(String),

    #[error("page '{page}' matches {} layout files: {candidates:?}", .candidates.len())]
    Ambiguous {
        page: String,
        candidates: Vec<PathBuf>,
    },

    #[error("layout {0} has a non-object 'data' property")]
    Layout(PathBuf),

    #[error("{0} still mentions IPageOrder after removing its registrations")]
    LingeringRegistration(PathBuf),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger error: {0}")]
    Db(String),
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Registry(_) => "registry",
            Self::Oracle(_) => "oracle",
            Self::OracleEmpty(_) => "oracle_empty",
            Self::OracleTimeout(_) => "oracle_timeout",
            Self::InvalidInstruction { .. } => "invalid_instruction",
            Self::Unresolved(_) => "unresolved_page",
            Self::Ambiguous { .. } => "ambiguous_page",
            Self::Layout(_) => "layout",
            Self::LingeringRegistration(_) => "lingering_registration",
            Self::Git { .. } => "git",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Db(_) => "db_error",
        }
    }
}

impl From<anyhow::Error> for MigrationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Db(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
