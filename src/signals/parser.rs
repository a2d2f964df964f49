//! Extraction of `<blocker>` question tags from agent output.

use std::sync::LazyLock;

use regex::Regex;

use crate::util::truncate_chars;

static BLOCKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<blocker>\s*(.*?)\s*</blocker>").expect("blocker pattern is valid")
});

const MAX_TITLE_CHARS: usize = 80;

/// A question the agent asked through its output instead of the issue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSignal {
    /// Full question text, used as the blocker description.
    pub question: String,
}

impl QuestionSignal {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }

    /// Short blocker title: the first line of the question.
    pub fn title(&self) -> String {
        let first = self.question.lines().next().unwrap_or_default().trim();
        if first.chars().count() <= MAX_TITLE_CHARS {
            first.to_string()
        } else {
            let cut: String = first.chars().take(MAX_TITLE_CHARS - 3).collect();
            format!("{cut}...")
        }
    }

    /// Description bounded so it fits comfortably in an issue body.
    pub fn description(&self) -> String {
        truncate_chars(&self.question, 4000)
    }
}

/// Every non-empty `<blocker>` tag in `text`, in order of appearance.
pub fn extract_questions(text: &str) -> Vec<QuestionSignal> {
    BLOCKER_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .filter(|q| !q.is_empty())
        .map(QuestionSignal::new)
        .collect()
}

/// The question that halted the run, if any. Earlier tags may have been
/// answered by the agent itself within the same run, so only the last counts.
pub fn last_question(text: &str) -> Option<QuestionSignal> {
    extract_questions(text).pop()
}
