//! Issue data model shared by the store, the engine and the agent invoker.
//!
//! Field names follow the `bd --json` output so the same types deserialize the
//! beads CLI and back the in-memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
    #[serde(other)]
    Unknown,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Blocked => "blocked",
            IssueStatus::Closed => "closed",
            IssueStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing dependency edge: the owning issue is blocked until `id` closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: IssueStatus,
    /// `blocks` for ordinary edges, `parent-child` for hierarchy edges.
    #[serde(default, alias = "type")]
    pub dependency_type: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl DependencyRef {
    /// Hierarchy edges never gate a phase.
    pub fn is_blocking(&self) -> bool {
        !self
            .dependency_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("parent-child"))
    }

    pub fn is_open(&self) -> bool {
        self.status != IssueStatus::Closed
    }
}

/// The unit of work moved through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub status: IssueStatus,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl Issue {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            labels: Vec::new(),
            status: IssueStatus::Open,
            dependencies: Vec::new(),
            parent: None,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn is_closed(&self) -> bool {
        self.status == IssueStatus::Closed
    }

    /// Dependencies that currently keep this issue from being actionable.
    pub fn open_blockers(&self) -> Vec<&DependencyRef> {
        self.dependencies
            .iter()
            .filter(|d| d.is_blocking() && d.is_open())
            .collect()
    }
}

/// A free-text comment on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub author: Option<String>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            author: None,
            text: text.into(),
            created_at: Some(Utc::now()),
        }
    }
}

/// Parameters for creating an issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub parent: Option<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }
}

/// Filter for listing issues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub label: Option<String>,
    pub status: Option<IssueStatus>,
    pub parent: Option<String>,
}

impl IssueFilter {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn open(mut self) -> Self {
        self.status = Some(IssueStatus::Open);
        self
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(ref label) = self.label
            && !issue.has_label(label)
        {
            return false;
        }
        if let Some(status) = self.status {
            // "open" means "not closed" for listing purposes
            let ok = match status {
                IssueStatus::Open => !issue.is_closed(),
                other => issue.status == other,
            };
            if !ok {
                return false;
            }
        }
        if let Some(ref parent) = self.parent
            && issue.parent.as_deref() != Some(parent.as_str())
        {
            return false;
        }
        true
    }
}
