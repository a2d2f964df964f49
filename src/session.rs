//! Session Manager: one durable agent session per issue, persisted as a marker
//! comment on the issue itself.

use std::sync::Arc;

use uuid::Uuid;

use crate::agent::AgentRuntime;
use crate::errors::StoreError;
use crate::issue::Comment;
use crate::store::IssueStore;

/// Prefix of the comment that records an issue's session id.
pub const SESSION_MARKER: &str = "conveyor-session:";

/// Session id recorded in a single comment, if the comment is a marker.
pub fn parse_marker(text: &str) -> Option<&str> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix(SESSION_MARKER))
        .filter_map(|rest| rest.split_whitespace().next())
        .next()
}

/// First session id recorded in `comments`.
pub fn find_session_id(comments: &[Comment]) -> Option<String> {
    comments
        .iter()
        .find_map(|c| parse_marker(&c.text))
        .map(|id| id.to_string())
}

pub fn marker_comment(session_id: &str) -> String {
    format!("{SESSION_MARKER} {session_id}")
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn IssueStore>,
    runtime: Arc<dyn AgentRuntime>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn IssueStore>, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self { store, runtime }
    }

    /// Session id already recorded on the issue, without creating one.
    pub async fn find_session(&self, issue_id: &str) -> Result<Option<String>, StoreError> {
        let comments = self.store.list_comments(issue_id).await?;
        Ok(find_session_id(&comments))
    }

    /// Return the issue's session id, recording a new one on first use.
    pub async fn get_or_create_session(&self, issue_id: &str) -> Result<String, StoreError> {
        if let Some(existing) = self.find_session(issue_id).await? {
            return Ok(existing);
        }
        let session_id = Uuid::new_v4().to_string();
        self.store
            .add_comment(issue_id, &marker_comment(&session_id))
            .await?;
        tracing::info!(issue_id, session_id = %session_id, "created agent session");
        Ok(session_id)
    }

    /// Whether the runtime has state for `session_id`; decides fresh vs. resume.
    pub fn session_exists(&self, session_id: &str) -> bool {
        self.runtime.session_exists(session_id)
    }
}
