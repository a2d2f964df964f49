//! Agent Invoker: runs one agent turn for an issue in the issue's session and
//! reports whether the agent finished or stopped to ask a question.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::prompts::ask_resume_contract;
use super::{AgentOutcome, AgentRuntime};
use crate::blocker::{BlockerKind, open_blocker};
use crate::errors::AgentError;
use crate::issue::Issue;
use crate::session::SessionManager;
use crate::signals::last_question;
use crate::store::IssueStore;
use crate::util::issue_slug;

#[derive(Clone)]
pub struct AgentInvoker {
    store: Arc<dyn IssueStore>,
    runtime: Arc<dyn AgentRuntime>,
    sessions: SessionManager,
    bd_cmd: String,
    transcript_dir: Option<PathBuf>,
}

impl AgentInvoker {
    pub fn new(
        store: Arc<dyn IssueStore>,
        runtime: Arc<dyn AgentRuntime>,
        bd_cmd: impl Into<String>,
    ) -> Self {
        let sessions = SessionManager::new(store.clone(), runtime.clone());
        Self {
            store,
            runtime,
            sessions,
            bd_cmd: bd_cmd.into(),
            transcript_dir: None,
        }
    }

    /// Write each prompt and output under `dir`.
    pub fn with_transcripts(mut self, dir: PathBuf) -> Self {
        self.transcript_dir = Some(dir);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run `prompt` (plus the ask/resume contract) for `issue` in `workdir`.
    ///
    /// The agent's question is detected two ways: any open blocking dependency
    /// that appeared during the run, or a `<blocker>` tag in the output, in which
    /// case the blocker is opened here. A new blocker of any kind stops the phase,
    /// since the issue is blocked on it either way.
    pub async fn invoke(
        &self,
        issue: &Issue,
        prompt: &str,
        workdir: &Path,
    ) -> Result<AgentOutcome, AgentError> {
        let session_id = self.sessions.get_or_create_session(&issue.id).await?;
        let before = open_blocker_ids(&self.store.get_issue(&issue.id).await?);

        let full_prompt = format!(
            "{}\n\n{}",
            prompt.trim_end(),
            ask_resume_contract(&self.bd_cmd, &issue.id)
        );

        let resume = self.sessions.session_exists(&session_id);
        tracing::info!(
            issue_id = %issue.id,
            session_id = %session_id,
            mode = if resume { "resume" } else { "fresh" },
            workdir = %workdir.display(),
            "invoking agent"
        );

        let result = if resume {
            self.runtime
                .resume_session(&session_id, &full_prompt, workdir)
                .await
        } else {
            self.runtime
                .start_session(&session_id, &full_prompt, workdir)
                .await
        };

        let transcript_output = match &result {
            Ok(output) => output.as_str(),
            Err(AgentError::NonZeroExit { output, .. }) => output.as_str(),
            Err(_) => "",
        };
        if let Err(err) = self.write_transcript(&issue.id, &full_prompt, transcript_output) {
            tracing::warn!(issue_id = %issue.id, error = %err, "failed to write transcript");
        }
        let output = result?;

        let after = self.store.get_issue(&issue.id).await?;
        if let Some(blocker_id) = open_blocker_ids(&after)
            .into_iter()
            .find(|id| !before.contains(id))
        {
            tracing::info!(issue_id = %issue.id, blocker_id = %blocker_id, "agent asked a question");
            return Ok(AgentOutcome::AwaitingInput { blocker_id, output });
        }

        if let Some(question) = last_question(&output) {
            let blocker_id = open_blocker(
                self.store.as_ref(),
                &issue.id,
                BlockerKind::HumanInput,
                &question.title(),
                &question.description(),
            )
            .await?;
            tracing::info!(
                issue_id = %issue.id,
                blocker_id = %blocker_id,
                "agent asked a question in its output"
            );
            return Ok(AgentOutcome::AwaitingInput { blocker_id, output });
        }

        Ok(AgentOutcome::Completed { output })
    }

    fn write_transcript(&self, issue_id: &str, prompt: &str, output: &str) -> Result<(), AgentError> {
        let Some(ref dir) = self.transcript_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir).map_err(|source| AgentError::TranscriptWriteFailed {
            path: dir.clone(),
            source,
        })?;
        let stem = format!(
            "{}-{}",
            issue_slug(issue_id, 60),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );
        for (path, contents) in [
            (dir.join(format!("{stem}.prompt.md")), prompt),
            (dir.join(format!("{stem}.output.log")), output),
        ] {
            std::fs::write(&path, contents)
                .map_err(|source| AgentError::TranscriptWriteFailed { path, source })?;
        }
        Ok(())
    }
}

fn open_blocker_ids(issue: &Issue) -> HashSet<String> {
    issue.open_blockers().into_iter().map(|d| d.id.clone()).collect()
}
