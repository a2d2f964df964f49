//! Version-control operations consumed by the workspace manager and the merge
//! controller.
//!
//! - `git` — implementation over the git CLI (mutations) and git2 (queries)

pub mod git;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::VcsError;

pub use git::GitCli;

/// Narrow version-control contract. Repository-level operations (`fetch`,
/// `checkout`, `merge_ff_only`, worktree and branch management) run in the main
/// checkout; rebase operations run in the given worktree.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Root of the main checkout.
    fn repo_root(&self) -> &Path;

    /// Create a worktree at `path` on `branch`. With `base`, `branch` is created
    /// from it; without, the existing `branch` is checked out.
    async fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError>;

    /// Forcibly remove the worktree at `path`.
    async fn remove_worktree(&self, path: &Path) -> Result<(), VcsError>;

    async fn delete_branch(&self, branch: &str) -> Result<(), VcsError>;

    async fn fetch(&self, remote: &str, reference: &str) -> Result<(), VcsError>;

    /// Rebase the branch checked out in `workdir` onto `onto`.
    async fn rebase(&self, workdir: &Path, onto: &str) -> Result<(), VcsError>;

    /// Paths with unresolved conflicts in `workdir`, relative to it.
    async fn conflicting_files(&self, workdir: &Path) -> Result<Vec<PathBuf>, VcsError>;

    async fn rebase_in_progress(&self, workdir: &Path) -> Result<bool, VcsError>;

    /// Commit the resolved index and carry on with an in-progress rebase.
    async fn continue_rebase(&self, workdir: &Path) -> Result<(), VcsError>;

    async fn abort_rebase(&self, workdir: &Path) -> Result<(), VcsError>;

    /// Stage and commit everything in `workdir`. Returns false when there was
    /// nothing to commit.
    async fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool, VcsError>;

    async fn checkout(&self, reference: &str) -> Result<(), VcsError>;

    /// Fast-forward the checked-out branch to `branch`; never creates a merge commit.
    async fn merge_ff_only(&self, branch: &str) -> Result<(), VcsError>;

    /// True if local `branch` exists and is reachable from `into`.
    async fn branch_merged(&self, branch: &str, into: &str) -> Result<bool, VcsError>;
}
