//! Phase State Machine.
//!
//! `Engine` runs one phase for a batch of issues. Each issue is processed in
//! isolation: whatever goes wrong with one is recorded in its `PhaseOutcome`
//! and the batch moves on. Only an invalid invocation (an unknown phase name)
//! fails the whole run.

mod phases;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::instrument;

use crate::agent::{AgentInvoker, AgentRuntime};
use crate::conveyor_config::{ChecksConfig, FailurePolicy};
use crate::errors::EngineError;
use crate::issue::{DependencyRef, Issue, IssueFilter};
use crate::lease::Lease;
use crate::merge::MergeController;
use crate::phase::{Phase, phase_labels_of};
use crate::store::IssueStore;
use crate::vcs::Vcs;
use crate::workspace::{Workspace, WorkspaceManager};

/// Knobs the engine needs from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub trunk: String,
    /// Empty disables fetching; the branch is rebased onto the local trunk.
    pub remote: String,
    pub worktree_dir: PathBuf,
    pub branch_prefix: String,
    pub bd_cmd: String,
    pub failure_policy: FailurePolicy,
    pub checks: ChecksConfig,
    /// Per-issue leases are taken here when set.
    pub lease_dir: Option<PathBuf>,
    /// Agent prompts and outputs are written here when set.
    pub transcript_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trunk: "main".to_string(),
            remote: "origin".to_string(),
            worktree_dir: PathBuf::from(".worktrees"),
            branch_prefix: "conveyor/".to_string(),
            bd_cmd: "bd".to_string(),
            failure_policy: FailurePolicy::Advance,
            checks: ChecksConfig::default(),
            lease_dir: None,
            transcript_dir: None,
        }
    }
}

/// What one phase run did to one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The issue now carries `to`.
    Advanced { to: &'static str },
    /// The agent asked a question; the issue waits on `blocker_id`.
    AwaitingInput { blocker_id: String },
    /// A human gate was opened; the issue waits on `blocker_id`.
    AwaitingApproval { blocker_id: String },
    /// The issue was not eligible for this phase.
    Skipped { reason: String },
    /// Merge stopped without escalation; labels are unchanged.
    Halted { reason: String },
    /// Merge failed and a human was asked to take over.
    Escalated { blocker_id: String },
    /// The agent failed and the `hold` policy kept the issue where it was.
    Held { reason: String },
    Failed { error: String },
}

impl PhaseOutcome {
    /// Outcomes that make the batch exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, PhaseOutcome::Held { .. } | PhaseOutcome::Failed { .. })
    }
}

impl std::fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseOutcome::Advanced { to } => write!(f, "advanced to {to}"),
            PhaseOutcome::AwaitingInput { blocker_id } => {
                write!(f, "waiting for an answer on {blocker_id}")
            }
            PhaseOutcome::AwaitingApproval { blocker_id } => {
                write!(f, "waiting for sign-off on {blocker_id}")
            }
            PhaseOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            PhaseOutcome::Halted { reason } => write!(f, "halted: {reason}"),
            PhaseOutcome::Escalated { blocker_id } => write!(f, "escalated to {blocker_id}"),
            PhaseOutcome::Held { reason } => write!(f, "held: {reason}"),
            PhaseOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReport {
    pub issue_id: String,
    pub outcome: PhaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub phase: Phase,
    pub results: Vec<IssueReport>,
}

impl BatchReport {
    pub fn failures(&self) -> Vec<&IssueReport> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_failure())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }
}

/// Where an issue stands, for finding stuck work.
#[derive(Debug, Clone)]
pub struct IssueStatusReport {
    pub issue: Issue,
    /// Phase labels present, in pipeline order. More than one means a transition was interrupted.
    pub phase_labels: Vec<&'static str>,
    pub session_id: Option<String>,
    pub open_blockers: Vec<DependencyRef>,
    pub workspace: Workspace,
    pub workspace_exists: bool,
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn IssueStore>,
    vcs: Arc<dyn Vcs>,
    invoker: AgentInvoker,
    workspaces: WorkspaceManager,
    merge: MergeController,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: Arc<dyn IssueStore>,
        vcs: Arc<dyn Vcs>,
        runtime: Arc<dyn AgentRuntime>,
        settings: EngineSettings,
    ) -> Self {
        let mut invoker = AgentInvoker::new(store.clone(), runtime, settings.bd_cmd.clone());
        if let Some(ref dir) = settings.transcript_dir {
            invoker = invoker.with_transcripts(dir.clone());
        }
        let workspaces = WorkspaceManager::new(
            vcs.clone(),
            settings.worktree_dir.clone(),
            settings.branch_prefix.clone(),
            settings.trunk.clone(),
        );
        let merge = MergeController::new(
            store.clone(),
            vcs.clone(),
            workspaces.clone(),
            invoker.clone(),
            settings.trunk.clone(),
            settings.remote.clone(),
        );
        Self {
            store,
            vcs,
            invoker,
            workspaces,
            merge,
            settings,
        }
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn invoker(&self) -> &AgentInvoker {
        &self.invoker
    }

    pub async fn status(&self, issue_id: &str) -> Result<IssueStatusReport, EngineError> {
        let issue = self.store.get_issue(issue_id).await?;
        let session_id = self.invoker.sessions().find_session(issue_id).await?;
        let workspace = self.workspaces.workspace_for(issue_id);
        Ok(IssueStatusReport {
            phase_labels: phase_labels_of(&issue.labels),
            open_blockers: issue.open_blockers().into_iter().cloned().collect(),
            workspace_exists: workspace.path.exists(),
            workspace,
            session_id,
            issue,
        })
    }

    /// Run `phase_name` for every issue in `issue_ids`. An unknown phase fails
    /// before any issue is touched.
    pub async fn run_batch(
        &self,
        phase_name: &str,
        issue_ids: &[String],
    ) -> Result<BatchReport, EngineError> {
        let phase: Phase = phase_name.parse()?;
        Ok(self.run_phase(phase, issue_ids).await)
    }

    /// Run `phase` for each issue in order.
    pub async fn run_phase(&self, phase: Phase, issue_ids: &[String]) -> BatchReport {
        let mut results = Vec::with_capacity(issue_ids.len());
        for issue_id in issue_ids {
            let outcome = self.run_issue(phase, issue_id).await;
            results.push(IssueReport {
                issue_id: issue_id.clone(),
                outcome,
            });
        }
        let report = BatchReport { phase, results };
        tracing::info!(
            phase = %phase,
            issues = report.results.len(),
            failures = report.failures().len(),
            "batch finished"
        );
        report
    }

    /// Run `phase` for one issue under its lease. Never returns an error; any
    /// failure is folded into `PhaseOutcome::Failed`.
    #[instrument(skip(self), fields(phase = %phase))]
    pub async fn run_issue(&self, phase: Phase, issue_id: &str) -> PhaseOutcome {
        let _lease = match self.settings.lease_dir {
            Some(ref dir) => match Lease::try_acquire(dir, issue_id) {
                Ok(Some(lease)) => Some(lease),
                Ok(None) => {
                    tracing::info!("lease held by another run, skipping");
                    return PhaseOutcome::Skipped {
                        reason: "lease held by another run".to_string(),
                    };
                }
                Err(err) => {
                    tracing::warn!(error = %err, "could not take lease");
                    return PhaseOutcome::Failed {
                        error: err.to_string(),
                    };
                }
            },
            None => None,
        };

        match self.dispatch(phase, issue_id).await {
            Ok(outcome) => {
                if outcome.is_failure() {
                    tracing::warn!(%outcome, "phase did not complete");
                } else {
                    tracing::info!(%outcome, "phase finished");
                }
                outcome
            }
            Err(err) => {
                tracing::warn!(error = %err, "phase failed");
                PhaseOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Open issues carrying `phase`'s entry or in-progress label, in store order
    /// without duplicates.
    pub async fn candidates(&self, phase: Phase) -> Result<Vec<String>, EngineError> {
        let mut ids: Vec<String> = Vec::new();
        for label in phase.candidate_labels() {
            let issues = self
                .store
                .list_issues(&IssueFilter::with_label(label).open())
                .await?;
            for issue in issues {
                if !ids.contains(&issue.id) {
                    ids.push(issue.id);
                }
            }
        }
        Ok(ids)
    }

    /// Scheduler entry point: run `phase` over every candidate.
    pub async fn tick(&self, phase: Phase) -> Result<BatchReport, EngineError> {
        let ids = self.candidates(phase).await?;
        tracing::info!(phase = %phase, candidates = ids.len(), "tick");
        Ok(self.run_phase(phase, &ids).await)
    }
}
