//! Per-repository format / lint / type-check commands run by the lint phase.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::conveyor_config::ChecksConfig;

/// Outcome of one check command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub command: String,
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Configured checks in run order. Absent commands are skipped.
pub fn configured(checks: &ChecksConfig) -> Vec<(&'static str, &str)> {
    [
        ("format", checks.format.as_deref()),
        ("lint", checks.lint.as_deref()),
        ("typecheck", checks.typecheck.as_deref()),
    ]
    .into_iter()
    .filter_map(|(name, cmd)| cmd.filter(|c| !c.trim().is_empty()).map(|c| (name, c)))
    .collect()
}

/// Run `command` verbatim through `sh -c` in `workdir`.
pub async fn run_check(name: &str, command: &str, workdir: &Path) -> CheckResult {
    tracing::debug!(check = name, command, workdir = %workdir.display(), "running check");
    let result = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            CheckResult {
                name: name.to_string(),
                command: command.to_string(),
                success: output.status.success(),
                output: text,
            }
        }
        Err(err) => CheckResult {
            name: name.to_string(),
            command: command.to_string(),
            success: false,
            output: format!("failed to spawn: {err}"),
        },
    }
}

/// Run every configured check, in order, and return all results.
pub async fn run_checks(checks: &ChecksConfig, workdir: &Path) -> Vec<CheckResult> {
    let mut results = Vec::new();
    for (name, command) in configured(checks) {
        let result = run_check(name, command, workdir).await;
        if result.success {
            tracing::info!(check = name, "check passed");
        } else {
            tracing::warn!(check = name, command, "check failed");
        }
        results.push(result);
    }
    results
}
