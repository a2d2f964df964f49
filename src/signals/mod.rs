//! Question signals embedded in agent output.
//!
//! The agent is told to ask questions by opening a blocker in the issue store.
//! When it cannot reach the store it may instead end its output with
//!
//! - `<blocker>Which OAuth provider should we use?</blocker>`
//!
//! and the invoker opens the blocker on its behalf.

mod parser;

pub use parser::{QuestionSignal, extract_questions, last_question};
