use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;

use super::IssueStore;
use crate::errors::StoreError;
use crate::issue::{Comment, Issue, IssueFilter, IssueStatus, NewIssue};

/// `IssueStore` backed by the beads `bd` CLI, run inside the target repository.
#[derive(Debug, Clone)]
pub struct BeadsStore {
    bd_cmd: String,
    repo_dir: PathBuf,
}

impl BeadsStore {
    pub fn new(bd_cmd: impl Into<String>, repo_dir: &Path) -> Self {
        Self {
            bd_cmd: bd_cmd.into(),
            repo_dir: repo_dir.to_path_buf(),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.bd_cmd, args.join(" "))
    }

    /// Run `bd` with `args` and return stdout.
    async fn bd(&self, args: &[&str]) -> Result<String, StoreError> {
        let command = self.describe(args);
        tracing::debug!(command = %command, "running issue store command");

        let output = Command::new(&self.bd_cmd)
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| StoreError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(StoreError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn bd_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, StoreError> {
        let stdout = self.bd(args).await?;
        serde_json::from_str(&stdout).map_err(|source| StoreError::Parse {
            command: self.describe(args),
            source,
        })
    }
}

/// `bd show --json` prints either a single object or a one-element array.
pub fn parse_show_output(stdout: &str) -> Result<Option<Issue>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(stdout)?;
    match value {
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => Ok(Some(serde_json::from_value(first)?)),
            None => Ok(None),
        },
        other => Ok(Some(serde_json::from_value(other)?)),
    }
}

/// Extract the new issue id from `bd create --json` output.
pub fn parse_created_id(stdout: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(stdout).ok()?;
    let obj = match value {
        serde_json::Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    obj.get("id").and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[async_trait]
impl IssueStore for BeadsStore {
    async fn create_issue(&self, new: NewIssue) -> Result<String, StoreError> {
        let labels = new.labels.join(",");
        let mut args: Vec<&str> = vec!["create", new.title.as_str()];
        if let Some(ref description) = new.description {
            args.extend(["--description", description.as_str()]);
        }
        if !labels.is_empty() {
            args.extend(["--labels", labels.as_str()]);
        }
        if let Some(ref parent) = new.parent {
            args.extend(["--parent", parent.as_str()]);
        }
        args.push("--json");

        let stdout = self.bd(&args).await?;
        parse_created_id(&stdout).ok_or_else(|| StoreError::CommandFailed {
            command: self.describe(&args),
            stderr: format!("no issue id in output: {}", stdout.trim()),
        })
    }

    async fn get_issue(&self, id: &str) -> Result<Issue, StoreError> {
        let args = ["show", id, "--json"];
        let stdout = self.bd(&args).await?;
        parse_show_output(&stdout)
            .map_err(|source| StoreError::Parse {
                command: self.describe(&args),
                source,
            })?
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_string() })
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        self.bd(&["label", "add", id, label]).await.map(|_| ())
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), StoreError> {
        match self.bd(&["label", "remove", id, label]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                // bd may refuse to remove a label that is not there; that is success for us
                let issue = self.get_issue(id).await?;
                if issue.has_label(label) {
                    Err(err)
                } else {
                    tracing::debug!(issue_id = id, label, "label already absent");
                    Ok(())
                }
            }
        }
    }

    async fn update_status(&self, id: &str, status: IssueStatus) -> Result<(), StoreError> {
        self.bd(&["update", id, "--status", status.as_str()])
            .await
            .map(|_| ())
    }

    async fn close_issue(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        self.bd(&["close", id, "--reason", reason]).await.map(|_| ())
    }

    async fn add_dependency(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.bd(&["dep", "add", from, to]).await.map(|_| ())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<(), StoreError> {
        self.bd(&["comments", "add", id, text]).await.map(|_| ())
    }

    async fn list_comments(&self, id: &str) -> Result<Vec<Comment>, StoreError> {
        let comments: Option<Vec<Comment>> = self.bd_json(&["comments", id, "--json"]).await?;
        Ok(comments.unwrap_or_default())
    }

    async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, StoreError> {
        let mut args: Vec<&str> = vec!["list"];
        if let Some(ref label) = filter.label {
            args.extend(["--label", label.as_str()]);
        }
        if let Some(ref parent) = filter.parent {
            args.extend(["--parent", parent.as_str()]);
        }
        if let Some(status) = filter.status
            && status != IssueStatus::Open
        {
            args.extend(["--status", status.as_str()]);
        }
        args.push("--json");

        let issues: Option<Vec<Issue>> = self.bd_json(&args).await?;
        // bd's default listing already hides closed issues; apply the rest locally
        Ok(issues
            .unwrap_or_default()
            .into_iter()
            .filter(|issue| filter.matches(issue))
            .collect())
    }
}
