//! Local working trees and the git operations performed on them.
//!
//! Every repository gets its own directory under the workspace root, so a
//! failure halfway through one repository can never leave files behind in
//! another one's tree. The fleet still processes repositories one at a time.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{MigrationError, Result};
use crate::models::Repository;

/// Directory (relative to the repository root) holding the app project.
pub const PROJECT_DIR: &str = "App";
/// Composition root where `IPageOrder` implementations are registered.
pub const ENTRY_FILE: &str = "Program.cs";

/// Handle to one repository's working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<workspace_root>/<owner>/<name>`.
    pub fn for_repository(workspace_root: &Path, repo: &Repository) -> Self {
        Self::new(workspace_root.join(&repo.owner).join(&repo.name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn entry_file(&self) -> PathBuf {
        self.project_dir().join(ENTRY_FILE)
    }

    pub fn is_cloned(&self) -> bool {
        self.root.join(".git").exists()
    }

    /// True when the tree holds nothing but version-control metadata.
    pub fn is_empty(&self) -> Result<bool> {
        for entry in std::fs::read_dir(&self.root)? {
            if entry?.file_name() != ".git" {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `path` relative to the workspace root, or `path` itself when it lies outside.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Version-control operations the fleet performs on a workspace.
///
/// Paths passed to [`Vcs::stage`] may be absolute or relative to the
/// workspace root.
pub trait Vcs: Send + Sync {
    fn ensure_cloned(&self, repo: &Repository, workspace: &Workspace) -> Result<()>;

    /// Check out an existing branch, discarding local changes and untracked files.
    fn checkout(&self, workspace: &Workspace, branch: &str) -> Result<()>;

    fn create_branch(&self, workspace: &Workspace, name: &str) -> Result<()>;

    fn pull(&self, workspace: &Workspace) -> Result<()>;

    /// Stage a modification or deletion.
    fn stage(&self, workspace: &Workspace, path: &Path) -> Result<()>;

    fn commit(&self, workspace: &Workspace, message: &str) -> Result<()>;

    /// Push the current branch, setting its upstream.
    fn push(&self, workspace: &Workspace) -> Result<()>;
}

/// [`Vcs`] implemented by shelling out to the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    /// Sent as `http.extraHeader` on network operations.
    auth_header: Option<String>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate clone, pull and push with a registry token.
    pub fn with_token(token: &str) -> Self {
        Self {
            auth_header: Some(format!("Authorization: token {}", token)),
        }
    }

    fn git(&self, dir: &Path, args: &[&str], network: bool) -> Result<String> {
        let mut command = Command::new("git");
        command.current_dir(dir);
        if network {
            if let Some(header) = &self.auth_header {
                command.args(["-c", &format!("http.extraHeader={}", header)]);
            }
        }
        command.args(args);

        tracing::debug!(dir = %dir.display(), "git {}", args.join(" "));
        let output = command.output().map_err(|e| MigrationError::Git {
            command: args.join(" "),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(MigrationError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Vcs for GitCli {
    fn ensure_cloned(&self, repo: &Repository, workspace: &Workspace) -> Result<()> {
        if workspace.is_cloned() {
            tracing::debug!(path = %workspace.root().display(), "Reusing existing clone");
            return Ok(());
        }

        let parent = workspace.root().parent().ok_or_else(|| {
            MigrationError::Config(format!(
                "workspace {} has no parent directory",
                workspace.root().display()
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let target = workspace.root().to_string_lossy().to_string();
        self.git(parent, &["clone", &repo.clone_url, &target], true)?;
        tracing::info!(path = %target, "Cloned repository");
        Ok(())
    }

    fn checkout(&self, workspace: &Workspace, branch: &str) -> Result<()> {
        self.git(workspace.root(), &["checkout", "-f", branch], false)?;
        self.git(workspace.root(), &["clean", "-fd"], false)?;
        Ok(())
    }

    fn create_branch(&self, workspace: &Workspace, name: &str) -> Result<()> {
        self.git(workspace.root(), &["checkout", "-b", name], false)?;
        Ok(())
    }

    fn pull(&self, workspace: &Workspace) -> Result<()> {
        self.git(workspace.root(), &["pull", "--ff-only"], true)?;
        Ok(())
    }

    fn stage(&self, workspace: &Workspace, path: &Path) -> Result<()> {
        let relative = workspace.relative(path).to_string_lossy().to_string();
        self.git(workspace.root(), &["add", "-A", "--", &relative], false)?;
        Ok(())
    }

    fn commit(&self, workspace: &Workspace, message: &str) -> Result<()> {
        self.git(workspace.root(), &["commit", "-m", message], false)?;
        Ok(())
    }

    fn push(&self, workspace: &Workspace) -> Result<()> {
        self.git(
            workspace.root(),
            &["push", "--set-upstream", "origin", "HEAD"],
            true,
        )?;
        Ok(())
    }
}
