use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final outcome of processing one repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A migration branch was pushed and a pull request opened.
    Migrated,
    /// The repository had nothing implementing `IPageOrder`.
    NothingToMigrate,
}

impl Outcome {
    pub fn did_migrate(&self) -> bool {
        matches!(self, Self::Migrated)
    }

    pub fn from_did_migrate(did_migrate: bool) -> Self {
        if did_migrate {
            Self::Migrated
        } else {
            Self::NothingToMigrate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::NothingToMigrate => "nothing_to_migrate",
        }
    }
}

/// A row in the completion ledger. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub repository_id: i64,
    pub created_at: DateTime<Utc>,
    pub outcome: Outcome,
}
