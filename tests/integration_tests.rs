//! Integration tests for conveyor
//!
//! CLI behavior through the built binary, and the pipeline end to end against a
//! real git repository with an in-memory issue store.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use async_trait::async_trait;
use conveyor::agent::AgentRuntime;
use conveyor::engine::{Engine, EngineSettings, PhaseOutcome};
use conveyor::errors::AgentError;
use conveyor::issue::Issue;
use conveyor::phase::{Phase, current_phase_label, labels};
use conveyor::store::{IssueStore, MemoryStore};
use conveyor::vcs::GitCli;

fn conveyor() -> Command {
    cargo_bin_cmd!("conveyor")
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Repository on `main` with one commit and a local identity.
fn setup_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = git2::Repository::init_opts(dir.path(), &opts).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();
    config.set_bool("commit.gpgsign", false).unwrap();
    fs::write(dir.path().join("README.md"), "hello\n").unwrap();
    git(dir.path(), &["add", "README.md"]);
    git(dir.path(), &["commit", "-m", "init"]);
    dir
}

fn main_parent_counts(dir: &Path) -> Vec<usize> {
    let repo = git2::Repository::open(dir).unwrap();
    let head = repo
        .find_branch("main", git2::BranchType::Local)
        .unwrap()
        .get()
        .peel_to_commit()
        .unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push(head.id()).unwrap();
    walk.map(|oid| repo.find_commit(oid.unwrap()).unwrap().parent_count())
        .collect()
}

/// Agent that commits a file when asked to implement and otherwise just replies.
#[derive(Default)]
struct CommittingAgent {
    sessions: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl CommittingAgent {
    fn turn(&self, session_id: &str, prompt: &str, workdir: &Path) -> String {
        self.sessions.lock().unwrap().push(session_id.to_string());
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("# Implement") {
            fs::write(workdir.join("feature.txt"), "feature\n").unwrap();
            git(workdir, &["add", "feature.txt"]);
            git(workdir, &["commit", "-m", "Add feature"]);
            return "Implemented and committed.".to_string();
        }
        "Looks good.".to_string()
    }
}

#[async_trait]
impl AgentRuntime for CommittingAgent {
    async fn start_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        Ok(self.turn(session_id, prompt, workdir))
    }

    async fn resume_session(
        &self,
        session_id: &str,
        prompt: &str,
        workdir: &Path,
    ) -> Result<String, AgentError> {
        Ok(self.turn(session_id, prompt, workdir))
    }

    fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().iter().any(|s| s == session_id)
    }
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conveyor_help() {
        conveyor()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("phase"))
            .stdout(predicate::str::contains("tick"));
    }

    #[test]
    fn test_conveyor_version() {
        conveyor().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_phase_exits_non_zero() {
        let dir = TempDir::new().unwrap();
        conveyor()
            .arg("--repo")
            .arg(dir.path())
            .args(["phase", "deploy", "bd-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown phase 'deploy'"));
    }

    #[test]
    fn test_phase_requires_issues() {
        conveyor().args(["phase", "lint"]).assert().failure();
    }

    #[test]
    fn test_phases_lists_pipeline() {
        conveyor()
            .arg("phases")
            .assert()
            .success()
            .stdout(predicate::str::contains("human-review"))
            .stdout(predicate::str::contains("needs-planning"))
            .stdout(predicate::str::contains("awaiting-human-review"));
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config_commands {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        conveyor()
            .arg("--repo")
            .arg(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created conveyor.toml"));

        let content = fs::read_to_string(dir.path().join(".conveyor/conveyor.toml")).unwrap();
        assert!(content.contains("trunk = \"main\""));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".conveyor")).unwrap();
        fs::write(
            dir.path().join(".conveyor/conveyor.toml"),
            "[defaults]\ntrunk = \"develop\"\n",
        )
        .unwrap();

        conveyor()
            .arg("--repo")
            .arg(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".conveyor/conveyor.toml")).unwrap();
        assert!(content.contains("develop"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".conveyor")).unwrap();
        fs::write(
            dir.path().join(".conveyor/conveyor.toml"),
            "[defaults]\ntrunk = \"\"\n",
        )
        .unwrap();

        conveyor()
            .arg("--repo")
            .arg(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("defaults.trunk is empty"));
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        conveyor()
            .arg("--repo")
            .arg(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("advance-on-best-effort"));
    }
}

// =============================================================================
// End-to-end pipeline on a real repository
// =============================================================================

mod pipeline {
    use super::*;

    fn engine(repo: &TempDir, state: &TempDir) -> (Engine, Arc<MemoryStore>, Arc<CommittingAgent>) {
        let store = Arc::new(MemoryStore::new());
        let agent = Arc::new(CommittingAgent::default());
        let settings = EngineSettings {
            remote: String::new(),
            lease_dir: Some(state.path().join("leases")),
            transcript_dir: Some(state.path().join("logs")),
            ..EngineSettings::default()
        };
        let engine = Engine::new(
            store.clone(),
            Arc::new(GitCli::new(repo.path())),
            agent.clone(),
            settings,
        );
        (engine, store, agent)
    }

    async fn close_gate(store: &MemoryStore, outcome: &PhaseOutcome) {
        let PhaseOutcome::AwaitingApproval { blocker_id } = outcome else {
            panic!("expected a gate, got {outcome:?}");
        };
        store.close_issue(blocker_id, "lgtm").await.unwrap();
    }

    #[tokio::test]
    async fn test_issue_flows_from_approved_to_merged_with_linear_trunk() {
        if !git_available() {
            return;
        }
        let repo = setup_repo();
        let state = TempDir::new().unwrap();
        let (engine, store, agent) = engine(&repo, &state);

        let mut issue = Issue::new("bd-42", "Add feature file");
        issue.labels.push(labels::APPROVED.to_string());
        store.insert(issue).unwrap();

        // trunk moves on while the issue is in flight
        let ids = vec!["bd-42".to_string()];
        for phase in [Phase::Implement, Phase::Lint, Phase::Review, Phase::Test] {
            let report = engine.run_phase(phase, &ids).await;
            assert!(
                matches!(report.results[0].outcome, PhaseOutcome::Advanced { .. }),
                "{phase}: {}",
                report.results[0].outcome
            );
            if phase == Phase::Implement {
                fs::write(repo.path().join("other.txt"), "trunk\n").unwrap();
                git(repo.path(), &["add", "other.txt"]);
                git(repo.path(), &["commit", "-m", "Unrelated trunk change"]);
            }
        }

        let gate = engine.run_issue(Phase::HumanReview, "bd-42").await;
        close_gate(&store, &gate).await;
        assert_eq!(
            engine.run_issue(Phase::HumanReview, "bd-42").await,
            PhaseOutcome::Advanced {
                to: labels::HUMAN_APPROVED
            }
        );

        let merged = engine.run_batch("merge", &ids).await.unwrap();
        assert!(merged.is_success());
        assert_eq!(
            merged.results[0].outcome,
            PhaseOutcome::Advanced { to: labels::MERGED }
        );

        let issue = store.get_issue("bd-42").await.unwrap();
        assert!(issue.is_closed());
        assert_eq!(current_phase_label(&issue.labels), Some(labels::MERGED));

        let parents = main_parent_counts(repo.path());
        assert_eq!(parents.len(), 3);
        assert!(parents.iter().all(|&n| n <= 1), "merge commit on main: {parents:?}");
        assert!(repo.path().join("feature.txt").exists());
        assert!(!repo.path().join(".worktrees/bd-42").exists());

        // implement, review and test share one session
        let sessions = agent.sessions.lock().unwrap().clone();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s == &sessions[0]));
        assert!(fs::read_dir(state.path().join("logs")).unwrap().count() >= 6);
    }
}
