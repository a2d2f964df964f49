//! Prompt templates for each agent phase.
//!
//! Every prompt the invoker sends ends with `ask_resume_contract`, so the way
//! the agent pauses to ask a question is the same in every phase.

use std::path::{Path, PathBuf};

use crate::checks::CheckResult;
use crate::issue::Issue;
use crate::phase::labels;
use crate::util::truncate_chars;

const MAX_CHECK_OUTPUT_CHARS: usize = 6000;
const MAX_CONFLICT_FILE_CHARS: usize = 8000;

/// A file left with conflict markers by a failed rebase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFile {
    pub path: PathBuf,
    /// Current contents including markers; `None` when the file could not be read.
    pub contents: Option<String>,
}

/// Shared instructions for pausing on uncertainty.
pub fn ask_resume_contract(bd_cmd: &str, issue_id: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("## When you are unsure\n\n");
    prompt.push_str(
        "Do not guess. If a decision needs information you do not have, ask a human \
         and stop:\n\n",
    );
    prompt.push_str(&format!(
        "1. `{bd} create \"<short question>\" --description \"<full context and the options \
         you see>\" --labels {label} --parent {id} --json`\n",
        bd = bd_cmd,
        label = labels::NEEDS_HUMAN_INPUT,
        id = issue_id,
    ));
    prompt.push_str(&format!(
        "2. `{bd} dep add {id} <new issue id>`\n",
        bd = bd_cmd,
        id = issue_id
    ));
    prompt.push_str("3. Stop immediately. Take no further action in this turn.\n\n");
    prompt.push_str(
        "If you cannot run these commands, end your reply with \
         `<blocker>your question with context and options</blocker>` instead.\n\n",
    );
    prompt.push_str(&format!(
        "When you are resumed, first read the answers: `{bd} show {id} --json` and \
         `{bd} comments {id}`. A closed blocker's close reason is the human's answer.\n",
        bd = bd_cmd,
        id = issue_id
    ));
    prompt
}

fn header(prompt: &mut String, task: &str, issue: &Issue) {
    prompt.push_str(&format!("# {}: {} ({})\n\n", task, issue.title, issue.id));
    if !issue.description.trim().is_empty() {
        prompt.push_str("## Issue\n\n");
        prompt.push_str(issue.description.trim());
        prompt.push_str("\n\n");
    }
}

pub fn plan(issue: &Issue, bd_cmd: &str) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Plan", issue);
    prompt.push_str("## Instructions\n\n");
    prompt.push_str("- Read the code this issue touches. Do not change any files.\n");
    prompt.push_str(
        "- Write an implementation plan: the files to change, the approach, and how it \
         will be tested.\n",
    );
    prompt.push_str(&format!(
        "- Post the plan as a comment: `{} comments add {} \"<plan>\"`.\n",
        bd_cmd, issue.id
    ));
    prompt.push_str(&format!(
        "- If the work is too large for one change, also create child issues with \
         `{} create \"<title>\" --parent {}`. Do not add labels to them.\n",
        bd_cmd, issue.id
    ));
    prompt.push_str("\nA human approves the plan before implementation starts.\n\n");
    prompt
}

pub fn implement(issue: &Issue, workdir: &Path, bd_cmd: &str) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Implement", issue);
    prompt.push_str("## Instructions\n\n");
    prompt.push_str(&format!(
        "- You are in a dedicated worktree at `{}` on the issue's own branch.\n",
        workdir.display()
    ));
    prompt.push_str(&format!(
        "- Follow the approved plan in the issue comments (`{} comments {}`).\n",
        bd_cmd, issue.id
    ));
    prompt.push_str("- Implement the change with tests and commit your work on this branch.\n");
    prompt.push_str("- Do not merge, rebase, or push.\n\n");
    prompt
}

pub fn lint_fix(issue: &Issue, failures: &[CheckResult]) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Fix checks", issue);
    prompt.push_str("The following checks fail in this worktree:\n\n");
    for check in failures {
        prompt.push_str(&format!("### {} (`{}`)\n\n", check.name, check.command));
        prompt.push_str("```\n");
        prompt.push_str(&truncate_chars(check.output.trim(), MAX_CHECK_OUTPUT_CHARS));
        prompt.push_str("\n```\n\n");
    }
    prompt.push_str("Fix the causes, re-run the commands until they pass, and commit.\n\n");
    prompt
}

pub fn review(issue: &Issue, trunk: &str) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Review", issue);
    prompt.push_str("## Instructions\n\n");
    prompt.push_str(&format!(
        "- Review this branch's changes against `{}` (`git diff {}...HEAD`).\n",
        trunk, trunk
    ));
    prompt.push_str("- Look for bugs, missing edge cases, and divergence from the plan.\n");
    prompt.push_str("- Fix what you find and commit. Summarize the review in your reply.\n\n");
    prompt
}

pub fn test(issue: &Issue) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Test", issue);
    prompt.push_str("## Instructions\n\n");
    prompt.push_str("- Run the project's test suite in this worktree.\n");
    prompt.push_str("- Add tests for behavior this change introduces that is not yet covered.\n");
    prompt.push_str("- Fix failures, commit, and report the final test results.\n\n");
    prompt
}

pub fn resolve_conflicts(issue: &Issue, onto: &str, files: &[ConflictFile]) -> String {
    let mut prompt = String::new();
    header(&mut prompt, "Resolve rebase conflicts", issue);
    prompt.push_str(&format!(
        "Rebasing this branch onto `{}` stopped with conflicts in {} file(s).\n\n",
        onto,
        files.len()
    ));
    for file in files {
        prompt.push_str(&format!("### {}\n\n", file.path.display()));
        match file.contents {
            Some(ref contents) => {
                prompt.push_str("```\n");
                prompt.push_str(&truncate_chars(contents, MAX_CONFLICT_FILE_CHARS));
                prompt.push_str("\n```\n\n");
            }
            None => prompt.push_str("(could not be read)\n\n"),
        }
    }
    prompt.push_str("## Procedure\n\n");
    prompt.push_str("1. Resolve every conflict marker in each file above, keeping both intents.\n");
    prompt.push_str("2. `git add` each resolved file.\n");
    prompt.push_str("3. `git rebase --continue`. Repeat from step 1 if later commits conflict.\n");
    prompt.push_str(
        "4. If the rebase still cannot complete, run `git rebase --abort` and report why.\n\n",
    );
    prompt
}
