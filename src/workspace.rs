//! Workspace Lifecycle Manager: one branch + worktree per issue, derived from
//! the issue id alone.

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::VcsError;
use crate::util::issue_slug;
use crate::vcs::Vcs;

const MAX_SLUG_LEN: usize = 60;

/// Branch and working-copy location of an issue's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub path: PathBuf,
    pub branch: String,
}

#[derive(Clone)]
pub struct WorkspaceManager {
    vcs: Arc<dyn Vcs>,
    worktree_dir: PathBuf,
    branch_prefix: String,
    trunk: String,
}

impl WorkspaceManager {
    /// `worktree_dir` is resolved against the repository root when relative.
    pub fn new(
        vcs: Arc<dyn Vcs>,
        worktree_dir: impl Into<PathBuf>,
        branch_prefix: impl Into<String>,
        trunk: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            worktree_dir: worktree_dir.into(),
            branch_prefix: branch_prefix.into(),
            trunk: trunk.into(),
        }
    }

    /// Deterministic workspace location for `issue_id`. Does not touch disk.
    pub fn workspace_for(&self, issue_id: &str) -> Workspace {
        let slug = issue_slug(issue_id, MAX_SLUG_LEN);
        let root = if self.worktree_dir.is_absolute() {
            self.worktree_dir.clone()
        } else {
            self.vcs.repo_root().join(&self.worktree_dir)
        };
        Workspace {
            path: root.join(&slug),
            branch: format!("{}{}", self.branch_prefix, slug),
        }
    }

    /// Create the issue's workspace unless it already exists.
    ///
    /// A new branch is cut from trunk first; if that fails (typically because the
    /// branch survives from an earlier partial run) the existing branch is checked
    /// out instead.
    pub async fn ensure_workspace(&self, issue_id: &str) -> Result<Workspace, VcsError> {
        let ws = self.workspace_for(issue_id);
        if ws.path.exists() {
            tracing::debug!(issue_id, path = %ws.path.display(), "workspace already present");
            return Ok(ws);
        }
        if let Some(parent) = ws.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| VcsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        match self
            .vcs
            .add_worktree(&ws.path, &ws.branch, Some(&self.trunk))
            .await
        {
            Ok(()) => {}
            Err(err) => {
                tracing::debug!(
                    issue_id,
                    branch = %ws.branch,
                    error = %err,
                    "new branch failed, reusing existing branch"
                );
                self.vcs.add_worktree(&ws.path, &ws.branch, None).await?;
            }
        }
        tracing::info!(
            issue_id,
            path = %ws.path.display(),
            branch = %ws.branch,
            "workspace ready"
        );
        Ok(ws)
    }

    /// Remove the worktree and delete the branch. Failures are logged, never returned.
    pub async fn destroy_workspace(&self, issue_id: &str) {
        let ws = self.workspace_for(issue_id);
        if let Err(err) = self.vcs.remove_worktree(&ws.path).await {
            tracing::warn!(issue_id, path = %ws.path.display(), error = %err, "failed to remove worktree");
        }
        if let Err(err) = self.vcs.delete_branch(&ws.branch).await {
            tracing::warn!(issue_id, branch = %ws.branch, error = %err, "failed to delete branch");
        }
    }
}
