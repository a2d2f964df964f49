//! Configuration file for conveyor: `.conveyor/conveyor.toml`.
//!
//! Layered as file → environment → CLI. A missing file means defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-service"
//! claude_cmd = "claude"
//! bd_cmd = "bd"
//!
//! [defaults]
//! trunk = "main"
//! remote = "origin"          # "" rebases onto the local trunk without fetching
//! worktree_dir = ".worktrees"
//! branch_prefix = "conveyor/"
//! skip_permissions = true
//! on_agent_failure = "advance"   # or "hold"
//!
//! [checks]
//! format = "cargo fmt"
//! lint = "cargo clippy -- -D warnings"
//! typecheck = "cargo check"
//!
//! [claude]
//! extra_args = ["--model", "opus"]
//! transcripts = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a phase does when the agent process itself fails.
///
/// | Policy | Label after failure | Batch result |
/// |--------|---------------------|--------------|
/// | `advance` (`advance-on-best-effort`) | next phase's label | ok |
/// | `hold` | in-progress label kept | failed |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    #[serde(alias = "advance-on-best-effort")]
    Advance,
    Hold,
}

impl FailurePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            FailurePolicy::Advance => "advance-on-best-effort",
            FailurePolicy::Hold => "hold",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "advance" | "advance-on-best-effort" => Ok(FailurePolicy::Advance),
            "hold" => Ok(FailurePolicy::Hold),
            _ => anyhow::bail!(
                "Invalid failure policy '{}'. Valid values: advance, hold",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
    /// beads CLI command (default: "bd")
    #[serde(default)]
    pub bd_cmd: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_trunk")]
    pub trunk: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_worktree_dir")]
    pub worktree_dir: PathBuf,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
    #[serde(default)]
    pub on_agent_failure: FailurePolicy,
}

fn default_trunk() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_worktree_dir() -> PathBuf {
    PathBuf::from(".worktrees")
}

fn default_branch_prefix() -> String {
    "conveyor/".to_string()
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            trunk: default_trunk(),
            remote: default_remote(),
            worktree_dir: default_worktree_dir(),
            branch_prefix: default_branch_prefix(),
            skip_permissions: default_skip_permissions(),
            on_agent_failure: FailurePolicy::default(),
        }
    }
}

/// Per-repository check commands, each run verbatim with `sh -c`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typecheck: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeSection {
    /// Where the CLI keeps session transcripts (default: ~/.claude/projects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_dir: Option<PathBuf>,
    /// Appended to every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Keep a copy of every prompt and output under .conveyor/logs
    #[serde(default = "default_transcripts")]
    pub transcripts: bool,
}

fn default_transcripts() -> bool {
    true
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            sessions_dir: None,
            extra_args: Vec::new(),
            transcripts: default_transcripts(),
        }
    }
}

/// The complete conveyor.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConveyorToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub claude: ClaudeSection,
}

impl ConveyorToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conveyor.toml")
    }

    /// Load `<conveyor_dir>/conveyor.toml`, or defaults if it does not exist.
    pub fn load_or_default(conveyor_dir: &Path) -> Result<Self> {
        let config_path = conveyor_dir.join("conveyor.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conveyor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Claude command: file → `CLAUDE_CMD` → "claude".
    pub fn claude_cmd(&self) -> String {
        self.project
            .claude_cmd
            .clone()
            .or_else(|| std::env::var("CLAUDE_CMD").ok())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// beads command: file → `BD_CMD` → "bd".
    pub fn bd_cmd(&self) -> String {
        self.project
            .bd_cmd
            .clone()
            .or_else(|| std::env::var("BD_CMD").ok())
            .unwrap_or_else(|| "bd".to_string())
    }

    /// `SKIP_PERMISSIONS` overrides the file.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var("SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.defaults.skip_permissions
    }

    /// `ON_AGENT_FAILURE` overrides the file; an unrecognized value is ignored.
    pub fn on_agent_failure(&self) -> FailurePolicy {
        match std::env::var("ON_AGENT_FAILURE") {
            Ok(env_val) => env_val.parse().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring ON_AGENT_FAILURE");
                self.defaults.on_agent_failure
            }),
            Err(_) => self.defaults.on_agent_failure,
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.claude.sessions_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".claude")
                .join("projects")
        })
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.trunk.trim().is_empty() {
            warnings.push("defaults.trunk is empty".to_string());
        }
        if self.defaults.branch_prefix.contains(char::is_whitespace) {
            warnings.push(format!(
                "defaults.branch_prefix '{}' contains whitespace",
                self.defaults.branch_prefix
            ));
        }
        if self.defaults.worktree_dir.as_os_str().is_empty() {
            warnings.push("defaults.worktree_dir is empty".to_string());
        }
        for (name, cmd) in [
            ("format", &self.checks.format),
            ("lint", &self.checks.lint),
            ("typecheck", &self.checks.typecheck),
        ] {
            if let Some(cmd) = cmd
                && cmd.trim().is_empty()
            {
                warnings.push(format!("checks.{name} is set but empty; it will be skipped"));
            }
        }
        if self.checks == ChecksConfig::default() {
            warnings.push("no [checks] configured; the lint phase will pass through".to_string());
        }

        warnings
    }
}

/// Configuration resolved for one repository, merging file, environment and CLI.
#[derive(Debug, Clone)]
pub struct ConveyorConfig {
    pub repo_dir: PathBuf,
    /// `<repo>/.conveyor`
    pub conveyor_dir: PathBuf,
    pub toml: ConveyorToml,
    /// CLI override: verbose logging
    pub verbose: bool,
}

impl ConveyorConfig {
    pub fn new(repo_dir: PathBuf) -> Result<Self> {
        let repo_dir = repo_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve repository directory {}", repo_dir.display()))?;
        let conveyor_dir = repo_dir.join(".conveyor");
        let toml = ConveyorToml::load_or_default(&conveyor_dir)?;
        Ok(Self {
            repo_dir,
            conveyor_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_args(repo_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(repo_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.conveyor_dir.join("conveyor.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.conveyor_dir.join("logs")
    }

    pub fn lease_dir(&self) -> PathBuf {
        self.conveyor_dir.join("leases")
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
