//! Integration (Merge) Controller.
//!
//! Rebases the issue's branch onto trunk, hands conflicts to the agent, and
//! fast-forwards trunk. Trunk never receives a merge commit.

use std::path::Path;
use std::sync::Arc;

use crate::agent::prompts::{self, ConflictFile};
use crate::agent::{AgentInvoker, AgentOutcome};
use crate::blocker::{BlockerKind, open_blocker};
use crate::errors::EngineError;
use crate::issue::Issue;
use crate::phase::labels;
use crate::store::IssueStore;
use crate::vcs::Vcs;
use crate::workspace::{Workspace, WorkspaceManager};

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Rebased cleanly and fast-forwarded; the issue is closed.
    Clean,
    /// The agent resolved rebase conflicts and trunk was fast-forwarded.
    AgentResolved,
    /// The rebase failed for a reason other than conflicts and was aborted.
    /// Labels are untouched and nothing is escalated.
    Halted { reason: String },
    /// Fast-forward failed; the issue is `merge-failed` and blocked on `blocker_id`.
    Escalated { blocker_id: String },
    /// The agent asked a question while resolving conflicts.
    AwaitingInput { blocker_id: String },
}

#[derive(Clone)]
pub struct MergeController {
    store: Arc<dyn IssueStore>,
    vcs: Arc<dyn Vcs>,
    workspaces: WorkspaceManager,
    invoker: AgentInvoker,
    trunk: String,
    remote: String,
}

impl MergeController {
    pub fn new(
        store: Arc<dyn IssueStore>,
        vcs: Arc<dyn Vcs>,
        workspaces: WorkspaceManager,
        invoker: AgentInvoker,
        trunk: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            store,
            vcs,
            workspaces,
            invoker,
            trunk: trunk.into(),
            remote: remote.into(),
        }
    }

    /// Ref the branch is rebased onto.
    pub fn rebase_target(&self) -> String {
        if self.remote.is_empty() {
            self.trunk.clone()
        } else {
            format!("{}/{}", self.remote, self.trunk)
        }
    }

    pub async fn merge(&self, issue: &Issue) -> Result<MergeOutcome, EngineError> {
        let ws = self.workspaces.workspace_for(&issue.id);

        if !self.remote.is_empty()
            && let Err(err) = self.vcs.fetch(&self.remote, &self.trunk).await
        {
            tracing::warn!(issue_id = %issue.id, remote = %self.remote, error = %err, "fetch failed, rebasing onto last known trunk");
        }

        match self.vcs.branch_merged(&ws.branch, &self.trunk).await {
            Ok(true) => {
                // a previous attempt fast-forwarded trunk but did not finish
                tracing::info!(issue_id = %issue.id, branch = %ws.branch, "branch already on trunk");
                self.finish(issue, &ws).await?;
                return Ok(MergeOutcome::Clean);
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(issue_id = %issue.id, branch = %ws.branch, error = %err, "could not check whether branch is merged");
            }
        }

        let onto = self.rebase_target();
        let mut resolved_by_agent = false;

        if let Err(rebase_err) = self.vcs.rebase(&ws.path, &onto).await {
            let conflicts = match self.vcs.conflicting_files(&ws.path).await {
                Ok(files) => files,
                Err(err) => {
                    tracing::warn!(issue_id = %issue.id, error = %err, "could not list conflicting files");
                    Vec::new()
                }
            };

            if conflicts.is_empty() {
                self.abort_rebase(&issue.id, &ws.path).await;
                let reason = format!("rebase onto {onto} failed without conflicts: {rebase_err}");
                tracing::warn!(issue_id = %issue.id, branch = %ws.branch, %reason, "merge halted");
                return Ok(MergeOutcome::Halted { reason });
            }

            tracing::info!(
                issue_id = %issue.id,
                files = conflicts.len(),
                "rebase conflicts, delegating to agent"
            );
            let files = read_conflicts(&ws.path, conflicts);
            let prompt = prompts::resolve_conflicts(issue, &onto, &files);
            match self.invoker.invoke(issue, &prompt, &ws.path).await {
                Ok(AgentOutcome::AwaitingInput { blocker_id, .. }) => {
                    self.abort_if_rebasing(&issue.id, &ws.path).await;
                    return Ok(MergeOutcome::AwaitingInput { blocker_id });
                }
                Ok(AgentOutcome::Completed { .. }) => {}
                Err(err) => {
                    tracing::warn!(issue_id = %issue.id, error = %err, "agent failed while resolving conflicts");
                }
            }
            // an unfinished rebase leaves the branch diverged, so the fast-forward below fails and escalates
            self.settle_rebase(&issue.id, &ws.path).await;
            resolved_by_agent = true;
        }

        let merged = match self.vcs.checkout(&self.trunk).await {
            Ok(()) => self.vcs.merge_ff_only(&ws.branch).await,
            Err(err) => Err(err),
        };

        match merged {
            Ok(()) => {
                self.finish(issue, &ws).await?;
                Ok(if resolved_by_agent {
                    MergeOutcome::AgentResolved
                } else {
                    MergeOutcome::Clean
                })
            }
            Err(err) => {
                let blocker_id = self.escalate(issue, &ws, &err.to_string()).await?;
                Ok(MergeOutcome::Escalated { blocker_id })
            }
        }
    }

    /// Record the merge on the issue, then drop the workspace.
    ///
    /// `human-approved` is removed only after the issue is closed, so a failure
    /// part way leaves the issue a merge candidate and the next attempt lands
    /// here again through `branch_merged`. The workspace goes last for the same
    /// reason.
    async fn finish(&self, issue: &Issue, ws: &Workspace) -> Result<(), EngineError> {
        tracing::info!(issue_id = %issue.id, branch = %ws.branch, trunk = %self.trunk, "fast-forwarded trunk");
        self.store.add_label(&issue.id, labels::MERGED).await?;
        self.store
            .close_issue(
                &issue.id,
                &format!("Merged {} into {} (fast-forward)", ws.branch, self.trunk),
            )
            .await?;
        self.store
            .remove_label(&issue.id, labels::HUMAN_APPROVED)
            .await?;
        self.workspaces.destroy_workspace(&issue.id).await;
        Ok(())
    }

    async fn escalate(&self, issue: &Issue, ws: &Workspace, error: &str) -> Result<String, EngineError> {
        tracing::warn!(issue_id = %issue.id, branch = %ws.branch, error, "fast-forward failed, escalating");
        self.store
            .remove_label(&issue.id, labels::HUMAN_APPROVED)
            .await?;
        self.store.add_label(&issue.id, labels::MERGE_FAILED).await?;
        let description = format!(
            "Fast-forward of `{branch}` into `{trunk}` failed for {id}.\n\n\
             Error: {error}\n\n\
             Workspace: {path}\n\n\
             Integrate the branch by hand (or fix it and relabel {id} `{approved}`), \
             then close this issue.",
            branch = ws.branch,
            trunk = self.trunk,
            id = issue.id,
            error = error,
            path = ws.path.display(),
            approved = labels::HUMAN_APPROVED,
        );
        let blocker_id = open_blocker(
            self.store.as_ref(),
            &issue.id,
            BlockerKind::HumanApproval,
            &format!("Merge failed: {}", issue.title),
            &description,
        )
        .await?;
        Ok(blocker_id)
    }

    async fn abort_rebase(&self, issue_id: &str, workdir: &Path) {
        if let Err(err) = self.vcs.abort_rebase(workdir).await {
            tracing::warn!(issue_id, error = %err, "rebase --abort failed");
        }
    }

    /// After the agent: finish a rebase it left with every conflict resolved,
    /// abort one that still has conflicts.
    async fn settle_rebase(&self, issue_id: &str, workdir: &Path) {
        match self.vcs.rebase_in_progress(workdir).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                tracing::warn!(issue_id, error = %err, "could not inspect rebase state");
                return;
            }
        }
        let resolved = matches!(self.vcs.conflicting_files(workdir).await, Ok(files) if files.is_empty());
        if resolved {
            match self.vcs.continue_rebase(workdir).await {
                Ok(()) => {
                    tracing::info!(issue_id, "continued rebase left open by agent");
                    return;
                }
                Err(err) => tracing::warn!(issue_id, error = %err, "rebase --continue failed"),
            }
        }
        self.abort_if_rebasing(issue_id, workdir).await;
    }

    async fn abort_if_rebasing(&self, issue_id: &str, workdir: &Path) {
        match self.vcs.rebase_in_progress(workdir).await {
            Ok(true) => {
                tracing::warn!(issue_id, "rebase still in progress after agent, aborting");
                self.abort_rebase(issue_id, workdir).await;
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(issue_id, error = %err, "could not inspect rebase state"),
        }
    }
}

fn read_conflicts(workdir: &Path, paths: Vec<std::path::PathBuf>) -> Vec<ConflictFile> {
    paths
        .into_iter()
        .map(|path| {
            let contents = std::fs::read_to_string(workdir.join(&path)).ok();
            ConflictFile { path, contents }
        })
        .collect()
}
