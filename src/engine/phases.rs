//! Per-phase procedures and the label transitions around them.

use std::path::Path;

use super::{Engine, PhaseOutcome};
use crate::agent::AgentOutcome;
use crate::agent::prompts;
use crate::blocker::{BlockerKind, gate_passed, open_blocker};
use crate::checks::{self, CheckResult};
use crate::conveyor_config::FailurePolicy;
use crate::errors::{AgentError, EngineError};
use crate::issue::{Issue, IssueStatus};
use crate::merge::MergeOutcome;
use crate::phase::{Phase, labels};
use crate::util::truncate_chars;

const MAX_BREADCRUMB_CHARS: usize = 4000;

/// Result of the agent step of a phase.
enum AgentStep {
    /// Move on to the next label.
    Proceed,
    /// Stop here with this outcome; labels stay as they are.
    Stop(PhaseOutcome),
}

impl Engine {
    /// Re-read the issue, check eligibility, and run `phase`'s procedure.
    pub(super) async fn dispatch(
        &self,
        phase: Phase,
        issue_id: &str,
    ) -> Result<PhaseOutcome, EngineError> {
        let issue = self.store.get_issue(issue_id).await?;
        if let Some(reason) = ineligible(phase, &issue) {
            tracing::info!(%reason, "not eligible");
            return Ok(PhaseOutcome::Skipped { reason });
        }

        match phase {
            Phase::Plan => self.plan(&issue).await,
            Phase::Approve => self.approve(&issue).await,
            Phase::Implement => self.implement(&issue).await,
            Phase::Lint => self.lint(&issue).await,
            Phase::Review => {
                let prompt = prompts::review(&issue, &self.settings.trunk);
                self.workspace_agent_phase(phase, &issue, prompt).await
            }
            Phase::Test => {
                let prompt = prompts::test(&issue);
                self.workspace_agent_phase(phase, &issue, prompt).await
            }
            Phase::HumanReview => self.human_review(&issue).await,
            Phase::Merge => self.integrate(&issue).await,
        }
    }

    async fn plan(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        self.enter(Phase::Plan, issue).await?;
        let prompt = prompts::plan(issue, &self.settings.bd_cmd);
        let root = self.vcs.repo_root().to_path_buf();
        if let AgentStep::Stop(outcome) = self.run_agent(Phase::Plan, issue, &prompt, &root).await? {
            return Ok(outcome);
        }
        self.advance(Phase::Plan, &issue.id).await?;
        self.open_plan_gate(issue).await
    }

    /// Gate: passes only once a human has closed an approval blocker. If none
    /// exists (its creation failed after the label moved) one is opened now.
    async fn approve(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        if !gate_passed(self.store.as_ref(), issue, BlockerKind::HumanApproval).await? {
            tracing::warn!(issue_id = %issue.id, "no closed approval blocker, opening one");
            return self.open_plan_gate(issue).await;
        }
        self.swap(&issue.id, labels::PENDING_APPROVAL, labels::APPROVED)
            .await?;
        Ok(PhaseOutcome::Advanced {
            to: labels::APPROVED,
        })
    }

    async fn open_plan_gate(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        let blocker_id = open_blocker(
            self.store.as_ref(),
            &issue.id,
            BlockerKind::HumanApproval,
            &format!("Approve plan: {}", issue.title),
            &format!(
                "Review the plan posted on {id} and close this issue to approve it.\n\n\
                 To request changes, comment on {id} first; the plan is revised on resume.",
                id = issue.id
            ),
        )
        .await?;
        Ok(PhaseOutcome::AwaitingApproval { blocker_id })
    }

    async fn implement(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        self.enter(Phase::Implement, issue).await?;
        let ws = self.workspaces.ensure_workspace(&issue.id).await?;
        let prompt = prompts::implement(issue, &ws.path, &self.settings.bd_cmd);
        self.agent_then_advance(Phase::Implement, issue, &prompt, &ws.path)
            .await
    }

    async fn lint(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        self.enter(Phase::Lint, issue).await?;
        let ws = self.workspaces.ensure_workspace(&issue.id).await?;

        if checks::configured(&self.settings.checks).is_empty() {
            tracing::info!("no checks configured");
            let to = self.advance(Phase::Lint, &issue.id).await?;
            return Ok(PhaseOutcome::Advanced { to });
        }

        let results = checks::run_checks(&self.settings.checks, &ws.path).await;
        if results.iter().any(|r| r.name == "format" && r.success) {
            match self.vcs.commit_all(&ws.path, "Apply formatting").await {
                Ok(true) => tracing::info!(branch = %ws.branch, "committed formatting changes"),
                Ok(false) => {}
                Err(err) => tracing::warn!(error = %err, "failed to commit formatting changes"),
            }
        }

        let failures: Vec<CheckResult> = results.into_iter().filter(|r| !r.success).collect();
        if failures.is_empty() {
            self.breadcrumb(&issue.id, "**lint**: all checks passed.").await;
            let to = self.advance(Phase::Lint, &issue.id).await?;
            return Ok(PhaseOutcome::Advanced { to });
        }

        let prompt = prompts::lint_fix(issue, &failures);
        self.agent_then_advance(Phase::Lint, issue, &prompt, &ws.path)
            .await
    }

    async fn workspace_agent_phase(
        &self,
        phase: Phase,
        issue: &Issue,
        prompt: String,
    ) -> Result<PhaseOutcome, EngineError> {
        self.enter(phase, issue).await?;
        let ws = self.workspaces.ensure_workspace(&issue.id).await?;
        self.agent_then_advance(phase, issue, &prompt, &ws.path).await
    }

    /// Gate in two steps: `tested` opens the review blocker; once a human has
    /// closed it `awaiting-human-review` moves on to `human-approved`.
    async fn human_review(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        if issue.has_label(labels::AWAITING_HUMAN_REVIEW) {
            if !gate_passed(self.store.as_ref(), issue, BlockerKind::HumanReview).await? {
                tracing::warn!(issue_id = %issue.id, "no closed review blocker, opening one");
                return self.open_review_gate(issue).await;
            }
            let to = self.advance(Phase::HumanReview, &issue.id).await?;
            return Ok(PhaseOutcome::Advanced { to });
        }

        self.enter(Phase::HumanReview, issue).await?;
        self.open_review_gate(issue).await
    }

    async fn open_review_gate(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        let ws = self.workspaces.workspace_for(&issue.id);
        let blocker_id = open_blocker(
            self.store.as_ref(),
            &issue.id,
            BlockerKind::HumanReview,
            &format!("Review before merge: {}", issue.title),
            &format!(
                "{id} passed lint, review and test.\n\n\
                 Branch: `{branch}` (worktree `{path}`)\n\
                 Diff: `git diff {trunk}...{branch}`\n\n\
                 Close this issue to approve the merge.",
                id = issue.id,
                branch = ws.branch,
                path = ws.path.display(),
                trunk = self.settings.trunk,
            ),
        )
        .await?;
        Ok(PhaseOutcome::AwaitingApproval { blocker_id })
    }

    async fn integrate(&self, issue: &Issue) -> Result<PhaseOutcome, EngineError> {
        Ok(match self.merge.merge(issue).await? {
            MergeOutcome::Clean | MergeOutcome::AgentResolved => PhaseOutcome::Advanced {
                to: labels::MERGED,
            },
            MergeOutcome::Halted { reason } => PhaseOutcome::Halted { reason },
            MergeOutcome::Escalated { blocker_id } => PhaseOutcome::Escalated { blocker_id },
            MergeOutcome::AwaitingInput { blocker_id } => PhaseOutcome::AwaitingInput { blocker_id },
        })
    }

    async fn agent_then_advance(
        &self,
        phase: Phase,
        issue: &Issue,
        prompt: &str,
        workdir: &Path,
    ) -> Result<PhaseOutcome, EngineError> {
        if let AgentStep::Stop(outcome) = self.run_agent(phase, issue, prompt, workdir).await? {
            return Ok(outcome);
        }
        let to = self.advance(phase, &issue.id).await?;
        Ok(PhaseOutcome::Advanced { to })
    }

    /// Invoke the agent and apply the failure policy to process failures.
    async fn run_agent(
        &self,
        phase: Phase,
        issue: &Issue,
        prompt: &str,
        workdir: &Path,
    ) -> Result<AgentStep, EngineError> {
        match self.invoker.invoke(issue, prompt, workdir).await {
            Ok(AgentOutcome::Completed { output }) => {
                self.breadcrumb(
                    &issue.id,
                    &format!(
                        "**{phase}** finished.\n\n{}",
                        truncate_chars(output.trim(), MAX_BREADCRUMB_CHARS)
                    ),
                )
                .await;
                Ok(AgentStep::Proceed)
            }
            Ok(AgentOutcome::AwaitingInput { blocker_id, .. }) => {
                Ok(AgentStep::Stop(PhaseOutcome::AwaitingInput { blocker_id }))
            }
            Err(err @ (AgentError::NonZeroExit { .. } | AgentError::SpawnFailed(_))) => {
                let policy = self.settings.failure_policy;
                tracing::warn!(error = %err, policy = %policy, "agent failed");
                let mut note = format!("**{phase}**: agent failed: {err}");
                if let AgentError::NonZeroExit { ref output, .. } = err
                    && !output.trim().is_empty()
                {
                    note.push_str(&format!(
                        "\n\n```\n{}\n```",
                        truncate_chars(output.trim(), MAX_BREADCRUMB_CHARS)
                    ));
                }
                match policy {
                    FailurePolicy::Advance => {
                        note.push_str(&format!("\n\nAdvancing anyway ({policy})."));
                        self.breadcrumb(&issue.id, &note).await;
                        Ok(AgentStep::Proceed)
                    }
                    FailurePolicy::Hold => {
                        note.push_str(&format!("\n\nHolding in place ({policy})."));
                        self.breadcrumb(&issue.id, &note).await;
                        Ok(AgentStep::Stop(PhaseOutcome::Held {
                            reason: err.to_string(),
                        }))
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Swap the entry label for the in-progress label and mark the issue in progress.
    async fn enter(&self, phase: Phase, issue: &Issue) -> Result<(), EngineError> {
        if let Some(active) = phase.active_label()
            && !issue.has_label(active)
        {
            self.swap(&issue.id, phase.entry_label(), active).await?;
        }
        if issue.status == IssueStatus::Open
            && let Err(err) = self
                .store
                .update_status(&issue.id, IssueStatus::InProgress)
                .await
        {
            tracing::warn!(error = %err, "failed to mark issue in progress");
        }
        Ok(())
    }

    /// Clear whichever of the phase's labels is present and add the next one.
    async fn advance(&self, phase: Phase, issue_id: &str) -> Result<&'static str, EngineError> {
        let next = phase.next_label();
        if let Some(active) = phase.active_label() {
            self.store.remove_label(issue_id, active).await?;
        }
        self.swap(issue_id, phase.entry_label(), next).await?;
        Ok(next)
    }

    async fn swap(&self, issue_id: &str, from: &str, to: &str) -> Result<(), EngineError> {
        self.store.remove_label(issue_id, from).await?;
        self.store.add_label(issue_id, to).await?;
        tracing::info!(issue_id, from, to, "label transition");
        Ok(())
    }

    async fn breadcrumb(&self, issue_id: &str, text: &str) {
        if let Err(err) = self.store.add_comment(issue_id, text).await {
            tracing::warn!(issue_id, error = %err, "failed to post comment");
        }
    }
}

/// Why `issue` cannot run `phase` right now, if it cannot.
fn ineligible(phase: Phase, issue: &Issue) -> Option<String> {
    if issue.is_closed() {
        return Some("issue is closed".to_string());
    }
    let blockers = issue.open_blockers();
    if !blockers.is_empty() {
        let ids: Vec<&str> = blockers.iter().map(|d| d.id.as_str()).collect();
        return Some(format!("blocked by {}", ids.join(", ")));
    }
    let candidates = phase.candidate_labels();
    if !candidates.iter().any(|l| issue.has_label(l)) {
        return Some(format!("not labeled {}", candidates.join(" or ")));
    }
    None
}
