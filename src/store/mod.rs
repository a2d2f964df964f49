//! Issue-store contract consumed by the engine.
//!
//! The store is an externally owned resource; every mutation the engine makes
//! goes through `IssueStore` so a test double can stand in for the real one.
//!
//! - `beads` — implementation backed by the `bd` CLI
//! - `memory` — in-memory implementation for tests and dry runs

pub mod beads;
pub mod memory;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::issue::{Comment, Issue, IssueFilter, IssueStatus, NewIssue};

pub use beads::BeadsStore;
pub use memory::MemoryStore;

/// Operations the engine relies on. All are assumed synchronous and strongly
/// consistent from the engine's point of view, and safe to retry.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Create an issue and return its identifier.
    async fn create_issue(&self, new: NewIssue) -> Result<String, StoreError>;

    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError>;

    async fn add_label(&self, id: &str, label: &str) -> Result<(), StoreError>;

    /// Removing a label the issue does not carry is not an error.
    async fn remove_label(&self, id: &str, label: &str) -> Result<(), StoreError>;

    async fn update_status(&self, id: &str, status: IssueStatus) -> Result<(), StoreError>;

    async fn close_issue(&self, id: &str, reason: &str) -> Result<(), StoreError>;

    /// `from` becomes blocked until `to` closes.
    async fn add_dependency(&self, from: &str, to: &str) -> Result<(), StoreError>;

    async fn add_comment(&self, id: &str, text: &str) -> Result<(), StoreError>;

    /// Comments in the order they were added.
    async fn list_comments(&self, id: &str) -> Result<Vec<Comment>, StoreError>;

    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError>;
}
