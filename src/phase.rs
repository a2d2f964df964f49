//! Pipeline phases and the labels that encode an issue's position.
//!
//! This module provides:
//! - `labels` with every phase label and blocker label
//! - `Phase` enum with each phase's entry / in-progress / success label
//! - Helpers for the single-current-phase-label invariant

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Label names used on issues. Phase labels form a total order; see `PIPELINE_ORDER`.
pub mod labels {
    pub const NEEDS_PLANNING: &str = "needs-planning";
    pub const PLANNING: &str = "planning";
    pub const PENDING_APPROVAL: &str = "pending-approval";
    pub const APPROVED: &str = "approved";
    pub const IMPLEMENTING: &str = "implementing";
    pub const TO_LINT: &str = "to-lint";
    pub const LINTING: &str = "linting";
    pub const TO_REVIEW: &str = "to-review";
    pub const REVIEWING: &str = "reviewing";
    pub const REVIEWED: &str = "reviewed";
    pub const TESTING: &str = "testing";
    pub const TESTED: &str = "tested";
    pub const AWAITING_HUMAN_REVIEW: &str = "awaiting-human-review";
    pub const HUMAN_APPROVED: &str = "human-approved";
    pub const MERGED: &str = "merged";
    pub const MERGE_FAILED: &str = "merge-failed";

    pub const NEEDS_HUMAN_INPUT: &str = "needs-human-input";
    pub const NEEDS_HUMAN_APPROVAL: &str = "needs-human-approval";
    pub const NEEDS_HUMAN_REVIEW: &str = "needs-human-review";
}

/// Every phase label in pipeline order. `merge-failed` sits beside `merged`
/// as the other terminal position of the merge phase.
pub const PIPELINE_ORDER: &[&str] = &[
    labels::NEEDS_PLANNING,
    labels::PLANNING,
    labels::PENDING_APPROVAL,
    labels::APPROVED,
    labels::IMPLEMENTING,
    labels::TO_LINT,
    labels::LINTING,
    labels::TO_REVIEW,
    labels::REVIEWING,
    labels::REVIEWED,
    labels::TESTING,
    labels::TESTED,
    labels::AWAITING_HUMAN_REVIEW,
    labels::HUMAN_APPROVED,
    labels::MERGED,
    labels::MERGE_FAILED,
];

/// The phase labels present on an issue, in pipeline order.
pub fn phase_labels_of(labels: &[String]) -> Vec<&'static str> {
    PIPELINE_ORDER
        .iter()
        .copied()
        .filter(|p| labels.iter().any(|l| l == p))
        .collect()
}

/// The issue's current phase label, if it carries exactly one.
pub fn current_phase_label(labels: &[String]) -> Option<&'static str> {
    match phase_labels_of(labels).as_slice() {
        [only] => Some(only),
        _ => None,
    }
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Plan,
    Approve,
    Implement,
    Lint,
    Review,
    Test,
    HumanReview,
    Merge,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Plan,
        Phase::Approve,
        Phase::Implement,
        Phase::Lint,
        Phase::Review,
        Phase::Test,
        Phase::HumanReview,
        Phase::Merge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Approve => "approve",
            Phase::Implement => "implement",
            Phase::Lint => "lint",
            Phase::Review => "review",
            Phase::Test => "test",
            Phase::HumanReview => "human-review",
            Phase::Merge => "merge",
        }
    }

    /// Label that makes an issue eligible for this phase.
    pub fn entry_label(&self) -> &'static str {
        match self {
            Phase::Plan => labels::NEEDS_PLANNING,
            Phase::Approve => labels::PENDING_APPROVAL,
            Phase::Implement => labels::APPROVED,
            Phase::Lint => labels::TO_LINT,
            Phase::Review => labels::TO_REVIEW,
            Phase::Test => labels::REVIEWED,
            Phase::HumanReview => labels::TESTED,
            Phase::Merge => labels::HUMAN_APPROVED,
        }
    }

    /// Label held while the phase is underway. It stays on the issue across an
    /// ask, so the next tick re-attempts the same phase.
    pub fn active_label(&self) -> Option<&'static str> {
        match self {
            Phase::Plan => Some(labels::PLANNING),
            Phase::Implement => Some(labels::IMPLEMENTING),
            Phase::Lint => Some(labels::LINTING),
            Phase::Review => Some(labels::REVIEWING),
            Phase::Test => Some(labels::TESTING),
            Phase::HumanReview => Some(labels::AWAITING_HUMAN_REVIEW),
            Phase::Approve | Phase::Merge => None,
        }
    }

    /// Label added when the phase completes.
    pub fn next_label(&self) -> &'static str {
        match self {
            Phase::Plan => labels::PENDING_APPROVAL,
            Phase::Approve => labels::APPROVED,
            Phase::Implement => labels::TO_LINT,
            Phase::Lint => labels::TO_REVIEW,
            Phase::Review => labels::REVIEWED,
            Phase::Test => labels::TESTED,
            Phase::HumanReview => labels::HUMAN_APPROVED,
            Phase::Merge => labels::MERGED,
        }
    }

    /// Gates never invoke the agent; they only wait for a human to close a blocker.
    pub fn is_human_gate(&self) -> bool {
        matches!(self, Phase::Approve | Phase::HumanReview)
    }

    /// Labels that make an issue a candidate for this phase on a scheduler tick.
    pub fn candidate_labels(&self) -> Vec<&'static str> {
        let mut labels = vec![self.entry_label()];
        if let Some(active) = self.active_label() {
            labels.push(active);
        }
        labels
    }

    fn valid_names() -> String {
        Phase::ALL
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Phase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plan" | "planning" => Ok(Phase::Plan),
            "approve" => Ok(Phase::Approve),
            "implement" => Ok(Phase::Implement),
            "lint" => Ok(Phase::Lint),
            "review" => Ok(Phase::Review),
            "test" => Ok(Phase::Test),
            "human-review" | "human_review" => Ok(Phase::HumanReview),
            "merge" => Ok(Phase::Merge),
            _ => Err(EngineError::UnknownPhase {
                name: s.to_string(),
                valid: Phase::valid_names(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_of(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_phase_from_str_round_trips_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.name().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_phase_from_str_unknown_is_error() {
        let err = "deploy".parse::<Phase>().unwrap_err();
        assert!(matches!(err, EngineError::UnknownPhase { ref name, .. } if name == "deploy"));
        assert!(err.to_string().contains("human-review"));
    }

    #[test]
    fn test_phase_from_str_is_case_insensitive() {
        assert_eq!("MERGE".parse::<Phase>().unwrap(), Phase::Merge);
    }

    #[test]
    fn test_each_phase_entry_is_previous_next() {
        for pair in Phase::ALL.windows(2) {
            assert_eq!(
                pair[0].next_label(),
                pair[1].entry_label(),
                "{} should feed {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_all_phase_labels_are_in_pipeline_order() {
        for phase in Phase::ALL {
            let mut expected = vec![phase.entry_label(), phase.next_label()];
            expected.extend(phase.active_label());
            for label in expected {
                assert_eq!(phase_labels_of(&labels_of(&[label])), vec![label]);
            }
        }
    }

    #[test]
    fn test_blocker_labels_are_not_phase_labels() {
        let blockers = labels_of(&[
            labels::NEEDS_HUMAN_INPUT,
            labels::NEEDS_HUMAN_APPROVAL,
            labels::NEEDS_HUMAN_REVIEW,
        ]);
        assert!(phase_labels_of(&blockers).is_empty());
    }

    #[test]
    fn test_current_phase_label_single() {
        let l = labels_of(&["backend", "to-lint"]);
        assert_eq!(current_phase_label(&l), Some("to-lint"));
    }

    #[test]
    fn test_current_phase_label_none_when_ambiguous() {
        let l = labels_of(&["to-lint", "linting"]);
        assert_eq!(current_phase_label(&l), None);
        assert_eq!(phase_labels_of(&l), vec!["to-lint", "linting"]);
    }

    #[test]
    fn test_gates_have_no_agent_work() {
        assert!(Phase::Approve.is_human_gate());
        assert!(Phase::HumanReview.is_human_gate());
        assert!(!Phase::Implement.is_human_gate());
    }

    #[test]
    fn test_candidate_labels_include_active_label() {
        assert_eq!(
            Phase::Implement.candidate_labels(),
            vec![labels::APPROVED, labels::IMPLEMENTING]
        );
        assert_eq!(Phase::Merge.candidate_labels(), vec![labels::HUMAN_APPROVED]);
    }
}
