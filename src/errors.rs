//! Typed error hierarchy for the conveyor engine.
//!
//! One enum per collaborator plus a top-level enum for the engine:
//! - `StoreError` — issue-store operations
//! - `VcsError` — version-control operations
//! - `AgentError` — agent runtime invocations
//! - `EngineError` — phase dispatch, leases, and everything above

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the issue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to spawn issue store command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Issue store command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to parse output of '{command}': {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Issue {id} not found")]
    IssueNotFound { id: String },

    #[error("Issue store lock poisoned")]
    LockPoisoned,
}

/// Errors from version-control operations.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Git repository error: {0}")]
    Git(#[from] git2::Error),

    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from invoking the agent runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Agent exited with non-zero code {exit_code}")]
    NonZeroExit { exit_code: i32, output: String },

    #[error("Failed to write transcript at {path}: {source}")]
    TranscriptWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level errors from the phase engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown phase '{name}'. Valid phases: {valid}")]
    UnknownPhase { name: String, valid: String },

    #[error("Failed to acquire lease at {path}: {source}")]
    Lease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
