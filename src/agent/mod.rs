//! Agent invocation.
//!
//! - `AgentRuntime` — the runtime contract (start, resume, session lookup)
//! - `claude` — runtime backed by the Claude CLI
//! - `invoker` — session-aware invocation with the ask/resume protocol
//! - `prompts` — phase prompts and the shared ask/resume contract

pub mod claude;
pub mod invoker;
pub mod prompts;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::AgentError;

pub use claude::ClaudeRuntime;
pub use invoker::AgentInvoker;

/// Operations the invoker needs from an agent runtime. Invocations are
/// non-interactive and block until the agent process exits.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start a fresh session that the runtime records under `session_id`.
    async fn start_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError>;

    /// Continue an existing session with a new prompt; prior context is held runtime-side.
    async fn resume_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError>;

    /// Whether the runtime has any recorded state for `session_id`.
    fn session_exists(&self, session_id: &str) -> bool;
}

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The agent finished its turn.
    Completed { output: String },
    /// The agent asked a question; the issue is blocked on `blocker_id`.
    AwaitingInput { blocker_id: String, output: String },
}
