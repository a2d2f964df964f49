//! Test doubles for the agent runtime, version control and the issue store.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::AgentRuntime;
use crate::blocker::{BlockerKind, open_blocker};
use crate::errors::{AgentError, StoreError, VcsError};
use crate::issue::{Comment, Issue, IssueFilter, IssueStatus, NewIssue};
use crate::store::{IssueStore, MemoryStore};
use crate::vcs::Vcs;

/// One scripted agent turn.
pub enum Step {
    Reply(String),
    /// Exit non-zero with this output.
    Fail(String),
    /// Open a `needs-human-input` blocker on `parent` through the store, the way
    /// a compliant agent would, then stop.
    AskViaStore { parent: String, question: String },
    /// Run a side effect in the workdir, then reply.
    Run(Box<dyn Fn(&Path) + Send + Sync>, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start { session_id: String, prompt: String, workdir: PathBuf },
    Resume { session_id: String, prompt: String, workdir: PathBuf },
}

impl RuntimeCall {
    pub fn prompt(&self) -> &str {
        match self {
            RuntimeCall::Start { prompt, .. } | RuntimeCall::Resume { prompt, .. } => prompt,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            RuntimeCall::Start { session_id, .. } | RuntimeCall::Resume { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn workdir(&self) -> &Path {
        match self {
            RuntimeCall::Start { workdir, .. } | RuntimeCall::Resume { workdir, .. } => workdir,
        }
    }
}

/// Agent runtime that plays back a script. An empty script replies "done".
#[derive(Default)]
pub struct FakeRuntime {
    sessions: Mutex<HashSet<String>>,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<RuntimeCall>>,
    store: Option<Arc<dyn IssueStore>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<dyn IssueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn reply(&self, output: &str) {
        self.push(Step::Reply(output.to_string()));
    }

    pub fn mark_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().insert(session_id.to_string());
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn play(&self, session_id: &str, workdir: &Path) -> Result<String, AgentError> {
        self.mark_session(session_id);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            None => Ok("done".to_string()),
            Some(Step::Reply(out)) => Ok(out),
            Some(Step::Fail(out)) => Err(AgentError::NonZeroExit {
                exit_code: 1,
                output: out,
            }),
            Some(Step::AskViaStore { parent, question }) => {
                let store = self
                    .store
                    .as_ref()
                    .expect("AskViaStore needs FakeRuntime::with_store");
                open_blocker(
                    store.as_ref(),
                    &parent,
                    BlockerKind::HumanInput,
                    &question,
                    &question,
                )
                .await?;
                Ok(format!("Asked: {question}"))
            }
            Some(Step::Run(effect, out)) => {
                effect(workdir);
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl AgentRuntime for FakeRuntime {
    async fn start_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        self.calls.lock().unwrap().push(RuntimeCall::Start {
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            workdir: workdir.to_path_buf(),
        });
        self.play(session_id, workdir).await
    }

    async fn resume_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        self.calls.lock().unwrap().push(RuntimeCall::Resume {
            session_id: session_id.to_string(),
            prompt: prompt.to_string(),
            workdir: workdir.to_path_buf(),
        });
        self.play(session_id, workdir).await
    }

    fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().contains(session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    AddWorktree { branch: String, base: Option<String> },
    RemoveWorktree(PathBuf),
    DeleteBranch(String),
    Fetch { remote: String, reference: String },
    Rebase { onto: String },
    ContinueRebase,
    AbortRebase,
    CommitAll(String),
    Checkout(String),
    MergeFfOnly(String),
}

#[derive(Debug, Default)]
struct FakeVcsState {
    calls: Vec<VcsCall>,
    fail_new_branch: bool,
    fail_cleanup: bool,
    fail_fetch: bool,
    fail_rebase: bool,
    conflicts: Vec<PathBuf>,
    fail_merge: bool,
    rebasing: bool,
    merged: bool,
}

/// Version control that records calls and fails on request. `add_worktree`
/// creates the directory so path-existence checks behave.
#[derive(Debug)]
pub struct FakeVcs {
    root: PathBuf,
    state: Mutex<FakeVcsState>,
}

impl FakeVcs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state: Mutex::new(FakeVcsState::default()),
        }
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail_new_branch(&self) {
        self.state.lock().unwrap().fail_new_branch = true;
    }

    pub fn fail_cleanup(&self) {
        self.state.lock().unwrap().fail_cleanup = true;
    }

    pub fn fail_fetch(&self) {
        self.state.lock().unwrap().fail_fetch = true;
    }

    /// The next rebase stops; `conflicts` lists the unmerged paths it reports.
    pub fn fail_rebase(&self, conflicts: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.fail_rebase = true;
        state.conflicts = conflicts.iter().map(PathBuf::from).collect();
    }

    pub fn fail_merge(&self) {
        self.state.lock().unwrap().fail_merge = true;
    }

    /// Report the issue branch as already reachable from trunk.
    pub fn mark_merged(&self) {
        self.state.lock().unwrap().merged = true;
    }

    /// Resolve every conflict but leave the rebase stopped, as an agent that
    /// staged its fixes without running `git rebase --continue` would.
    pub fn resolve_conflicts(&self) {
        self.state.lock().unwrap().conflicts.clear();
    }

    /// Resolve the in-progress rebase, as an agent finishing the job would.
    pub fn finish_rebase(&self) {
        let mut state = self.state.lock().unwrap();
        state.rebasing = false;
        state.conflicts.clear();
    }

    fn record(&self, call: VcsCall) -> std::sync::MutexGuard<'_, FakeVcsState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

fn failure(command: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        stderr: "simulated failure".to_string(),
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    async fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError> {
        let state = self.record(VcsCall::AddWorktree {
            branch: branch.to_string(),
            base: base.map(|b| b.to_string()),
        });
        if base.is_some() && state.fail_new_branch {
            return Err(failure("worktree add -b"));
        }
        std::fs::create_dir_all(path).map_err(|source| VcsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    async fn remove_worktree(&self, path: &Path) -> Result<(), VcsError> {
        let state = self.record(VcsCall::RemoveWorktree(path.to_path_buf()));
        if state.fail_cleanup {
            return Err(failure("worktree remove"));
        }
        let _ = std::fs::remove_dir_all(path);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), VcsError> {
        let state = self.record(VcsCall::DeleteBranch(branch.to_string()));
        if state.fail_cleanup {
            return Err(failure("branch -D"));
        }
        Ok(())
    }

    async fn fetch(&self, remote: &str, reference: &str) -> Result<(), VcsError> {
        let state = self.record(VcsCall::Fetch {
            remote: remote.to_string(),
            reference: reference.to_string(),
        });
        if state.fail_fetch {
            return Err(failure("fetch"));
        }
        Ok(())
    }

    async fn rebase(&self, _workdir: &Path, onto: &str) -> Result<(), VcsError> {
        let mut state = self.record(VcsCall::Rebase {
            onto: onto.to_string(),
        });
        if state.fail_rebase {
            state.rebasing = true;
            return Err(failure("rebase"));
        }
        Ok(())
    }

    async fn conflicting_files(&self, _workdir: &Path) -> Result<Vec<PathBuf>, VcsError> {
        let state = self.state.lock().unwrap();
        Ok(if state.rebasing {
            state.conflicts.clone()
        } else {
            Vec::new()
        })
    }

    async fn rebase_in_progress(&self, _workdir: &Path) -> Result<bool, VcsError> {
        Ok(self.state.lock().unwrap().rebasing)
    }

    async fn continue_rebase(&self, _workdir: &Path) -> Result<(), VcsError> {
        let mut state = self.record(VcsCall::ContinueRebase);
        if state.rebasing && !state.conflicts.is_empty() {
            return Err(failure("rebase --continue"));
        }
        state.rebasing = false;
        Ok(())
    }

    async fn abort_rebase(&self, _workdir: &Path) -> Result<(), VcsError> {
        let mut state = self.record(VcsCall::AbortRebase);
        state.rebasing = false;
        state.conflicts.clear();
        Ok(())
    }

    async fn commit_all(&self, _workdir: &Path, message: &str) -> Result<bool, VcsError> {
        self.record(VcsCall::CommitAll(message.to_string()));
        Ok(false)
    }

    async fn checkout(&self, reference: &str) -> Result<(), VcsError> {
        self.record(VcsCall::Checkout(reference.to_string()));
        Ok(())
    }

    async fn merge_ff_only(&self, branch: &str) -> Result<(), VcsError> {
        let state = self.record(VcsCall::MergeFfOnly(branch.to_string()));
        if state.fail_merge {
            return Err(failure("merge --ff-only"));
        }
        Ok(())
    }

    async fn branch_merged(&self, _branch: &str, _into: &str) -> Result<bool, VcsError> {
        Ok(self.state.lock().unwrap().merged)
    }
}

/// Store operations `FaultyStore` can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    CreateIssue,
    AddLabel,
    RemoveLabel,
    CloseIssue,
    AddDependency,
}

/// `MemoryStore` wrapper that fails chosen operations once each and can strip
/// dependency labels the way `bd show --json` does.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    pending: Mutex<Vec<StoreOp>>,
    bare_dependencies: bool,
    created: Mutex<usize>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            pending: Mutex::new(Vec::new()),
            bare_dependencies: false,
            created: Mutex::new(0),
        }
    }

    pub fn with_bare_dependencies(mut self) -> Self {
        self.bare_dependencies = true;
        self
    }

    /// Fail the next call of `op`.
    pub fn fail_once(&self, op: StoreOp) {
        self.pending.lock().unwrap().push(op);
    }

    /// Issues successfully created through this wrapper.
    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().unwrap();
        match pending.iter().position(|p| *p == op) {
            Some(i) => {
                pending.remove(i);
                Err(StoreError::CommandFailed {
                    command: format!("{op:?}"),
                    stderr: "transient".to_string(),
                })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IssueStore for FaultyStore {
    async fn create_issue(&self, new: NewIssue) -> Result<String, StoreError> {
        self.check(StoreOp::CreateIssue)?;
        let id = self.inner.create_issue(new).await?;
        *self.created.lock().unwrap() += 1;
        Ok(id)
    }

    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError> {
        let mut issue = self.inner.get_issue(id).await?;
        if self.bare_dependencies {
            for dep in &mut issue.dependencies {
                dep.labels.clear();
            }
        }
        Ok(issue)
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        self.check(StoreOp::AddLabel)?;
        self.inner.add_label(id, label).await
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        self.check(StoreOp::RemoveLabel)?;
        self.inner.remove_label(id, label).await
    }

    async fn update_status(&self, id: &str, status: IssueStatus) -> Result<(), StoreError> {
        self.inner.update_status(id, status).await
    }

    async fn close_issue(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        self.check(StoreOp::CloseIssue)?;
        self.inner.close_issue(id, reason).await
    }

    async fn add_dependency(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check(StoreOp::AddDependency)?;
        self.inner.add_dependency(from, to).await
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<(), StoreError> {
        self.inner.add_comment(id, text).await
    }

    async fn list_comments(&self, id: &str) -> Result<Vec<Comment>, StoreError> {
        self.inner.list_comments(id).await
    }

    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        self.inner.list_issues(filter).await
    }
}
