//! Fleet orchestrator: runs the migration over every repository the
//! registry lists, one repository at a time.
//!
//! Per repository:
//!
//! ```text
//! filter (ledger, open proposals) -> clone/checkout/pull -> scan
//!   -> empty scan:     record NothingToMigrate
//!   -> non-empty scan: consult oracle -> branch -> apply -> commit -> push
//!                      -> open pull request -> record Migrated
//! ```
//!
//! A failure anywhere aborts only the current repository. Nothing is recorded
//! for it, so the next run picks it up again.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::Instrument;

use crate::applier::{AppliedMigration, Applier};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::models::{MigrationBranch, Outcome, Repository};
use crate::oracle::{self, Oracle};
use crate::registry::{self, ProposalStatus, Registry};
use crate::scanner;
use crate::workspace::{Vcs, Workspace};

pub const COMMIT_MESSAGE: &str = "Automatic tracks migration";
pub const PROPOSAL_TITLE: &str = "Automatic tracks migration (generated with AI)";
pub const PROPOSAL_BODY: &str = "This PR is generated with an AI tool. The tool uses an LLM to read \
    the files implementing IPageOrder and generates the hidden expressions needed to preserve \
    their behaviour. The IPageOrder implementations and their registration are removed.";

/// Settings that shape a fleet run.
#[derive(Debug, Clone)]
pub struct FleetSettings {
    pub workspace_root: PathBuf,
    pub base_branch: String,
    /// Repositories with an open pull request from this user are skipped.
    pub service_user: String,
    pub page_size: u32,
    pub dry_run: bool,
}

/// What happened to one repository.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryResult {
    AlreadyProposed,
    NothingToMigrate,
    Migrated {
        branch: String,
        proposal: ProposalStatus,
    },
    /// Changes were applied locally but not committed.
    DryRun { branch: String, changed: usize },
}

/// Counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub already_recorded: usize,
    pub already_proposed: usize,
    pub nothing_to_migrate: usize,
    pub migrated: usize,
    pub dry_run: usize,
    /// Repository ids that failed and stay eligible for the next run.
    pub failed: Vec<i64>,
}

pub struct Fleet<R, O, V> {
    registry: R,
    oracle: O,
    vcs: V,
    ledger: Ledger,
    settings: FleetSettings,
}

impl<R, O, V> Fleet<R, O, V>
where
    R: Registry,
    O: Oracle,
    V: Vcs,
{
    pub fn new(registry: R, oracle: O, vcs: V, ledger: Ledger, settings: FleetSettings) -> Self {
        Self {
            registry,
            oracle,
            vcs,
            ledger,
            settings,
        }
    }

    /// Process every repository not yet in the ledger.
    ///
    /// Only discovery and ledger reads can fail the run; per-repository
    /// failures are logged and counted.
    pub async fn run(&self) -> Result<RunSummary> {
        let repos =
            registry::list_all_repositories(&self.registry, self.settings.page_size).await?;
        let processed = self.ledger.processed_ids()?;

        let mut summary = RunSummary {
            discovered: repos.len(),
            ..Default::default()
        };
        let pending = remaining(repos, &processed);
        summary.already_recorded = summary.discovered - pending.len();
        tracing::info!(
            discovered = summary.discovered,
            pending = pending.len(),
            dry_run = self.settings.dry_run,
            "Starting fleet run"
        );

        for repo in pending {
            let span = tracing::info_span!("repository", id = repo.id, repo = %repo.full_name());
            match self.process(&repo).instrument(span.clone()).await {
                Ok(result) => {
                    span.in_scope(|| tracing::info!(?result, "Repository done"));
                    match result {
                        RepositoryResult::AlreadyProposed => summary.already_proposed += 1,
                        RepositoryResult::NothingToMigrate => summary.nothing_to_migrate += 1,
                        RepositoryResult::Migrated { .. } => summary.migrated += 1,
                        RepositoryResult::DryRun { .. } => summary.dry_run += 1,
                    }
                }
                Err(e) => {
                    span.in_scope(|| {
                        tracing::error!(error = %e, kind = e.code(), "Repository failed, leaving it for the next run")
                    });
                    summary.failed.push(repo.id);
                }
            }
        }

        tracing::info!(?summary, "Fleet run finished");
        Ok(summary)
    }

    /// Drive one repository from discovery to the ledger.
    pub async fn process(&self, repo: &Repository) -> Result<RepositoryResult> {
        let proposers = self.registry.list_proposers(repo).await?;
        if proposers.iter().any(|p| p == &self.settings.service_user) {
            tracing::info!("Repository already has a migration pull request");
            return Ok(RepositoryResult::AlreadyProposed);
        }

        let workspace = Workspace::for_repository(&self.settings.workspace_root, repo);
        self.vcs.ensure_cloned(repo, &workspace)?;
        if workspace.is_empty()? {
            tracing::info!("Repository is empty");
            return self.finish_without_migration(repo);
        }

        self.vcs.checkout(&workspace, &self.settings.base_branch)?;
        self.vcs.pull(&workspace)?;

        let report = scanner::scan(&workspace)?;
        if report.is_empty() {
            tracing::info!("No IPageOrder implementations found, nothing to migrate");
            return self.finish_without_migration(repo);
        }

        let plan = oracle::consult(&self.oracle, report).await?;

        let branch = MigrationBranch::now();
        self.vcs.create_branch(&workspace, branch.name())?;
        let applied = Applier::new(&workspace, &self.vcs).apply_plan(plan)?;

        if self.settings.dry_run {
            tracing::info!(
                branch = %branch,
                layouts = applied.layouts.len(),
                retired = applied.retired.len(),
                "Dry run: leaving changes uncommitted"
            );
            return Ok(RepositoryResult::DryRun {
                branch: branch.name().to_string(),
                changed: changed_files(&applied),
            });
        }

        self.vcs.commit(&workspace, COMMIT_MESSAGE)?;
        self.vcs.push(&workspace)?;
        let proposal = self
            .registry
            .open_proposal(repo, branch.name(), PROPOSAL_TITLE, PROPOSAL_BODY)
            .await?;
        tracing::info!(number = proposal.number, url = %proposal.url, "Opened pull request");

        self.ledger.record(repo, Outcome::Migrated)?;
        Ok(RepositoryResult::Migrated {
            branch: branch.name().to_string(),
            proposal,
        })
    }

    fn finish_without_migration(&self, repo: &Repository) -> Result<RepositoryResult> {
        if !self.settings.dry_run {
            self.ledger.record(repo, Outcome::NothingToMigrate)?;
        }
        Ok(RepositoryResult::NothingToMigrate)
    }
}

/// Repositories not present in `processed`, in registry order.
pub fn remaining(repos: Vec<Repository>, processed: &HashSet<i64>) -> Vec<Repository> {
    repos
        .into_iter()
        .filter(|repo| !processed.contains(&repo.id))
        .collect()
}

fn changed_files(applied: &AppliedMigration) -> usize {
    applied.layouts.len() + applied.retired.len() + usize::from(applied.entry_file_changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(id: i64) -> Repository {
        Repository {
            id,
            name: format!("app-{}", id),
            owner: "ttd".into(),
            clone_url: format!("https://gitea.example/ttd/app-{}.git", id),
        }
    }

    #[test]
    fn test_remaining_filters_recorded_ids() {
        let processed: HashSet<i64> = [2].into_iter().collect();
        let left = remaining(vec![repo(1), repo(2), repo(3)], &processed);
        let ids: Vec<i64> = left.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
