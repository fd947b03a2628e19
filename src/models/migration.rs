use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source file believed to implement the `IPageOrder` contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLogicFile {
    /// Path relative to the workspace root.
    pub path: PathBuf,
    pub source: String,
}

/// Valid dot-separated `dataModel` paths, in declaration order.
///
/// Duplicates across several metadata files are dropped; the first
/// occurrence keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataModelVocabulary {
    paths: Vec<String>,
}

impl DataModelVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: BTreeSet<String> = self.paths.iter().cloned().collect();
        for path in paths {
            if seen.insert(path.clone()) {
                self.paths.push(path);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl FromIterator<String> for DataModelVocabulary {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        let mut vocabulary = Self::new();
        vocabulary.extend(iter);
        vocabulary
    }
}

/// Set the `hidden` property of one page layout to `expression`.
///
/// `expression` is the raw JSON text of a dynamic expression, for example
/// `["equals", ["dataModel", "funeral.isDead"], true]`. It is merged into the
/// layout as JSON, never as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransformationInstruction {
    pub page: String,
    pub expression: String,
}

/// The branch a migration is committed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationBranch {
    name: String,
}

impl MigrationBranch {
    pub const PREFIX: &'static str = "v4-automatic-tracks-migration";

    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            name: format!("{}-{}", Self::PREFIX, created_at.timestamp_millis()),
        }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for MigrationBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
