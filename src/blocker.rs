//! Blockers ("wisps"): short-lived sub-issues that gate their parent through a
//! dependency edge until a human closes them.

use crate::errors::StoreError;
use crate::issue::{Issue, NewIssue};
use crate::phase::labels;
use crate::store::IssueStore;

/// What a blocker is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerKind {
    /// The agent asked a question.
    HumanInput,
    /// A plan or a failed merge needs sign-off.
    HumanApproval,
    /// The change needs a human review before merge.
    HumanReview,
}

impl BlockerKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockerKind::HumanInput => labels::NEEDS_HUMAN_INPUT,
            BlockerKind::HumanApproval => labels::NEEDS_HUMAN_APPROVAL,
            BlockerKind::HumanReview => labels::NEEDS_HUMAN_REVIEW,
        }
    }

    pub fn matches(&self, issue_labels: &[String]) -> bool {
        issue_labels.iter().any(|l| l == self.label())
    }
}

/// Create a blocker and make `parent` depend on it.
///
/// The blocker is linked by the dependency edge only, not as a child of
/// `parent`: a child of a blocked issue would itself show as blocked.
///
/// Returns the blocker's id. If the dependency edge cannot be added the blocker
/// is left in place and the error is returned; retrying creates a second one.
pub async fn open_blocker(
    store: &dyn IssueStore,
    parent: &str,
    kind: BlockerKind,
    title: &str,
    description: &str,
) -> Result<String, StoreError> {
    let blocker_id = store
        .create_issue(
            NewIssue::new(title)
                .with_description(description)
                .with_label(kind.label()),
        )
        .await?;
    store.add_dependency(parent, &blocker_id).await?;
    tracing::info!(
        issue_id = parent,
        blocker_id = %blocker_id,
        kind = kind.label(),
        "opened blocker"
    );
    Ok(blocker_id)
}

/// Blocking dependencies of `issue` whose blocker carries `kind`'s label, open
/// or closed.
///
/// `bd show` lists dependencies without their labels, so each one is read back
/// from the store.
pub async fn blockers_of_kind(
    store: &dyn IssueStore,
    issue: &Issue,
    kind: BlockerKind,
) -> Result<Vec<Issue>, StoreError> {
    let mut found = Vec::new();
    for dep in issue.dependencies.iter().filter(|d| d.is_blocking()) {
        let blocker = store.get_issue(&dep.id).await?;
        if kind.matches(&blocker.labels) {
            found.push(blocker);
        }
    }
    Ok(found)
}

/// True once a human has closed a `kind` blocker of `issue`.
pub async fn gate_passed(
    store: &dyn IssueStore,
    issue: &Issue,
    kind: BlockerKind,
) -> Result<bool, StoreError> {
    Ok(blockers_of_kind(store, issue, kind)
        .await?
        .iter()
        .any(|b| b.is_closed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::FaultyStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_open_blocker_links_dependency() {
        let store = MemoryStore::new();
        store.insert(Issue::new("bd-1", "Add login")).unwrap();

        let id = open_blocker(
            &store,
            "bd-1",
            BlockerKind::HumanInput,
            "Which provider?",
            "Google or GitHub?",
        )
        .await
        .unwrap();

        let blocker = store.get_issue(&id).await.unwrap();
        assert!(blocker.has_label(labels::NEEDS_HUMAN_INPUT));
        assert_eq!(blocker.parent, None);
        assert_eq!(blocker.description, "Google or GitHub?");
        assert_eq!(store.dependency_ids("bd-1").unwrap(), vec![id.clone()]);

        let parent = store.get_issue("bd-1").await.unwrap();
        let input = blockers_of_kind(&store, &parent, BlockerKind::HumanInput)
            .await
            .unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(input[0].id, id);
        assert!(
            blockers_of_kind(&store, &parent, BlockerKind::HumanReview)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_gate_passes_only_after_blocker_closes() {
        let store = MemoryStore::new();
        store.insert(Issue::new("bd-1", "x")).unwrap();
        let parent = store.get_issue("bd-1").await.unwrap();
        assert!(!gate_passed(&store, &parent, BlockerKind::HumanApproval).await.unwrap());

        let id = open_blocker(&store, "bd-1", BlockerKind::HumanApproval, "ok?", "plan")
            .await
            .unwrap();
        let parent = store.get_issue("bd-1").await.unwrap();
        assert!(!gate_passed(&store, &parent, BlockerKind::HumanApproval).await.unwrap());

        store.close_issue(&id, "approved").await.unwrap();
        let parent = store.get_issue("bd-1").await.unwrap();
        assert!(gate_passed(&store, &parent, BlockerKind::HumanApproval).await.unwrap());
        assert!(!gate_passed(&store, &parent, BlockerKind::HumanReview).await.unwrap());
    }

    #[tokio::test]
    async fn test_kind_is_read_from_the_blocker_itself() {
        let inner = Arc::new(MemoryStore::new());
        inner.insert(Issue::new("bd-1", "x")).unwrap();
        let store = FaultyStore::new(inner).with_bare_dependencies();
        let id = open_blocker(&store, "bd-1", BlockerKind::HumanReview, "ok?", "diff")
            .await
            .unwrap();

        let parent = store.get_issue("bd-1").await.unwrap();
        assert!(parent.dependencies[0].labels.is_empty());
        let review = blockers_of_kind(&store, &parent, BlockerKind::HumanReview)
            .await
            .unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].id, id);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(BlockerKind::HumanInput.label(), "needs-human-input");
        assert_eq!(BlockerKind::HumanApproval.label(), "needs-human-approval");
        assert_eq!(BlockerKind::HumanReview.label(), "needs-human-review");
    }
}
