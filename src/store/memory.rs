use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::IssueStore;
use crate::errors::StoreError;
use crate::issue::{Comment, DependencyRef, Issue, IssueFilter, IssueStatus, NewIssue};

#[derive(Debug, Clone)]
struct StoredIssue {
    issue: Issue,
    /// Outgoing edges; resolved into `DependencyRef`s on read.
    depends_on: Vec<String>,
    comments: Vec<Comment>,
    close_reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    issues: BTreeMap<String, StoredIssue>,
    next_id: u64,
}

/// In-memory `IssueStore`. Dependencies are resolved at read time so a closed
/// blocker is immediately visible on its parent.
#[derive(Debug)]
pub struct MemoryStore {
    prefix: String,
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_prefix("mem")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Insert a fully formed issue (test setup). Existing issues with the same id are replaced.
    pub fn insert(&self, issue: Issue) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.issues.insert(
            issue.id.clone(),
            StoredIssue {
                issue,
                depends_on: Vec::new(),
                comments: Vec::new(),
                close_reason: None,
            },
        );
        Ok(())
    }

    /// Outgoing dependency edges of `id`, in insertion order.
    pub fn dependency_ids(&self, id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        let stored = state
            .issues
            .get(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })?;
        Ok(stored.depends_on.clone())
    }

    /// Reason recorded when `id` was closed.
    pub fn close_reason(&self, id: &str) -> Result<Option<String>, StoreError> {
        let state = self.lock()?;
        let stored = state
            .issues
            .get(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })?;
        Ok(stored.close_reason.clone())
    }

    /// All issues, resolved, in id order.
    pub fn all_issues(&self) -> Result<Vec<Issue>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .issues
            .keys()
            .filter_map(|id| resolve(&state, id))
            .collect())
    }
}

fn resolve(state: &State, id: &str) -> Option<Issue> {
    let stored = state.issues.get(id)?;
    let mut issue = stored.issue.clone();
    issue.dependencies = stored
        .depends_on
        .iter()
        .filter_map(|dep_id| state.issues.get(dep_id))
        .map(|dep| DependencyRef {
            id: dep.issue.id.clone(),
            title: dep.issue.title.clone(),
            status: dep.issue.status,
            dependency_type: Some("blocks".to_string()),
            labels: dep.issue.labels.clone(),
        })
        .collect();
    Some(issue)
}

fn stored_mut<'a>(state: &'a mut State, id: &str) -> Result<&'a mut StoredIssue, StoreError> {
    state
        .issues
        .get_mut(id)
        .ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn create_issue(&self, new: NewIssue) -> Result<String, StoreError> {
        let mut state = self.lock()?;
        if let Some(ref parent) = new.parent
            && !state.issues.contains_key(parent)
        {
            return Err(StoreError::IssueNotFound { id: parent.clone() });
        }
        state.next_id += 1;
        let id = format!("{}-{}", self.prefix, state.next_id);
        let mut issue = Issue::new(id.clone(), new.title);
        issue.description = new.description.unwrap_or_default();
        issue.labels = new.labels;
        issue.parent = new.parent;
        state.issues.insert(
            id.clone(),
            StoredIssue {
                issue,
                depends_on: Vec::new(),
                comments: Vec::new(),
                close_reason: None,
            },
        );
        Ok(id)
    }

    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError> {
        let state = self.lock()?;
        resolve(&state, id).ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let stored = stored_mut(&mut state, id)?;
        if !stored.issue.has_label(label) {
            stored.issue.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let stored = stored_mut(&mut state, id)?;
        stored.issue.labels.retain(|l| l != label);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: IssueStatus) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        stored_mut(&mut state, id)?.issue.status = status;
        Ok(())
    }

    async fn close_issue(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let stored = stored_mut(&mut state, id)?;
        stored.issue.status = IssueStatus::Closed;
        stored.close_reason = Some(reason.to_string());
        Ok(())
    }

    async fn add_dependency(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.issues.contains_key(to) {
            return Err(StoreError::IssueNotFound { id: to.to_string() });
        }
        let stored = stored_mut(&mut state, from)?;
        if !stored.depends_on.iter().any(|d| d == to) {
            stored.depends_on.push(to.to_string());
        }
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        stored_mut(&mut state, id)?.comments.push(Comment::new(text));
        Ok(())
    }

    async fn list_comments(&self, id: &str) -> Result<Vec<Comment>, StoreError> {
        let state = self.lock()?;
        let stored = state
            .issues
            .get(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })?;
        Ok(stored.comments.clone())
    }

    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .issues
            .keys()
            .filter_map(|id| resolve(&state, id))
            .filter(|issue| filter.matches(issue))
            .collect())
    }
}
