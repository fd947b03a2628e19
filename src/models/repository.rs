use serde::{Deserialize, Serialize};

/// A repository listed by the registry.
///
/// `id` is the registry's own identifier and the only key the ledger trusts;
/// names can be changed by their owners between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub owner: String,
    /// Address used by `git clone`.
    pub clone_url: String,
}

impl Repository {
    /// `owner/name`, used in log lines and API paths.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
