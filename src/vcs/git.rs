use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{BranchType, Repository, RepositoryState};
use tokio::process::Command;

use super::Vcs;
use crate::errors::VcsError;

/// `Vcs` over a local repository. Mutations shell out to `git`, whose worktree
/// and rebase support is complete; read-only queries use git2.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        tracing::debug!(dir = %dir.display(), args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            // `rebase --continue` must never open an editor
            .env("GIT_EDITOR", "true")
            .output()
            .await
            .map_err(VcsError::Spawn)?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(VcsError::CommandFailed {
                command: args.join(" "),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn path_str(path: &Path) -> Result<&str, VcsError> {
    path.to_str()
        .ok_or_else(|| VcsError::InvalidPath(path.to_path_buf()))
}

fn index_conflicts(workdir: &Path) -> Result<Vec<PathBuf>, VcsError> {
    let repo = Repository::open(workdir)?;
    let index = repo.index()?;
    let mut paths = BTreeSet::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        for entry in [conflict.our, conflict.their, conflict.ancestor]
            .into_iter()
            .flatten()
        {
            paths.insert(PathBuf::from(
                String::from_utf8_lossy(&entry.path).into_owned(),
            ));
        }
    }
    Ok(paths.into_iter().collect())
}

fn is_rebasing(workdir: &Path) -> Result<bool, VcsError> {
    let repo = Repository::open(workdir)?;
    Ok(matches!(
        repo.state(),
        RepositoryState::Rebase | RepositoryState::RebaseInteractive | RepositoryState::RebaseMerge
    ))
}

fn is_merged(repo_root: &Path, branch: &str, into: &str) -> Result<bool, VcsError> {
    let repo = Repository::open(repo_root)?;
    let Ok(branch_ref) = repo.find_branch(branch, BranchType::Local) else {
        return Ok(false);
    };
    let tip = branch_ref.get().peel_to_commit()?.id();
    let target = repo.revparse_single(into)?.peel_to_commit()?.id();
    Ok(tip == target || repo.graph_descendant_of(target, tip)?)
}

#[async_trait]
impl Vcs for GitCli {
    fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError> {
        let path = path_str(path)?;
        let args: Vec<&str> = match base {
            Some(base) => vec!["worktree", "add", "-b", branch, path, base],
            None => vec!["worktree", "add", path, branch],
        };
        self.git(&self.repo_root, &args).await.map(|_| ())
    }

    async fn remove_worktree(&self, path: &Path) -> Result<(), VcsError> {
        let path = path_str(path)?;
        self.git(&self.repo_root, &["worktree", "remove", "--force", path])
            .await
            .map(|_| ())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&self.repo_root, &["branch", "-D", branch])
            .await
            .map(|_| ())
    }

    async fn fetch(&self, remote: &str, reference: &str) -> Result<(), VcsError> {
        self.git(&self.repo_root, &["fetch", remote, reference])
            .await
            .map(|_| ())
    }

    async fn rebase(&self, workdir: &Path, onto: &str) -> Result<(), VcsError> {
        self.git(workdir, &["rebase", onto]).await.map(|_| ())
    }

    async fn conflicting_files(&self, workdir: &Path) -> Result<Vec<PathBuf>, VcsError> {
        index_conflicts(workdir)
    }

    async fn rebase_in_progress(&self, workdir: &Path) -> Result<bool, VcsError> {
        is_rebasing(workdir)
    }

    async fn continue_rebase(&self, workdir: &Path) -> Result<(), VcsError> {
        self.git(workdir, &["rebase", "--continue"]).await.map(|_| ())
    }

    async fn abort_rebase(&self, workdir: &Path) -> Result<(), VcsError> {
        self.git(workdir, &["rebase", "--abort"]).await.map(|_| ())
    }

    async fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool, VcsError> {
        let status = self.git(workdir, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Ok(false);
        }
        self.git(workdir, &["add", "-A"]).await?;
        self.git(workdir, &["commit", "-m", message]).await?;
        Ok(true)
    }

    async fn checkout(&self, reference: &str) -> Result<(), VcsError> {
        self.git(&self.repo_root, &["checkout", reference])
            .await
            .map(|_| ())
    }

    async fn merge_ff_only(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&self.repo_root, &["merge", "--ff-only", branch])
            .await
            .map(|_| ())
    }

    async fn branch_merged(&self, branch: &str, into: &str) -> Result<bool, VcsError> {
        is_merged(&self.repo_root, branch, into)
    }
}
