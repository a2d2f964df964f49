//! Agent runtime backed by the Claude CLI in print mode.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use walkdir::WalkDir;

use super::AgentRuntime;
use crate::errors::AgentError;

/// Runs `claude --print` with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeRuntime {
    claude_cmd: String,
    skip_permissions: bool,
    extra_args: Vec<String>,
    sessions_dir: PathBuf,
}

/// How a session is addressed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Fresh,
    Resume,
}

impl ClaudeRuntime {
    pub fn new(claude_cmd: impl Into<String>, sessions_dir: PathBuf) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            skip_permissions: true,
            extra_args: Vec::new(),
            sessions_dir,
        }
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_args(&self, mode: SessionMode, session_id: &str) -> Vec<String> {
        let mut args = vec!["--print".to_string()];
        match mode {
            SessionMode::Fresh => args.push("--session-id".to_string()),
            SessionMode::Resume => args.push("--resume".to_string()),
        }
        args.push(session_id.to_string());
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn run(
        &self,
        mode: SessionMode,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        let args = self.build_args(mode, session_id);
        tracing::debug!(
            command = %self.claude_cmd,
            args = ?args,
            workdir = %workdir.display(),
            prompt_chars = prompt.len(),
            "spawning agent"
        );

        // Nested invocations refuse to start when this is inherited.
        let mut child = Command::new(&self.claude_cmd)
            .args(&args)
            .env_remove("CLAUDECODE")
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AgentError::SpawnFailed)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(AgentError::SpawnFailed)?;
            stdin.shutdown().await.map_err(AgentError::SpawnFailed)?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(AgentError::SpawnFailed)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        if !output.status.success() {
            return Err(AgentError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                output: combined,
            });
        }
        Ok(combined)
    }
}

#[async_trait]
impl AgentRuntime for ClaudeRuntime {
    async fn start_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        self.run(SessionMode::Fresh, session_id, prompt, workdir).await
    }

    async fn resume_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        self.run(SessionMode::Resume, session_id, prompt, workdir).await
    }

    /// Claude stores each session as `<projects>/<project-key>/<id>.jsonl`.
    fn session_exists(&self, session_id: &str) -> bool {
        let target = format!("{session_id}.jsonl");
        WalkDir::new(&self.sessions_dir)
            .max_depth(3)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_type().is_file() && entry.file_name() == target.as_str())
    }
}
