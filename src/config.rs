use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::ClaudeRuntime;
use crate::conveyor_config::ConveyorConfig;
use crate::engine::{Engine, EngineSettings};
use crate::store::BeadsStore;
use crate::vcs::GitCli;

/// Runtime configuration for conveyor.
///
/// Bridges the layered `ConveyorConfig` to what a run needs: resolved commands,
/// state directories, and a wired-up `Engine`.
#[derive(Debug, Clone)]
pub struct Config {
    pub repo_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lease_dir: PathBuf,
    pub claude_cmd: String,
    pub bd_cmd: String,
    pub skip_permissions: bool,
    pub sessions_dir: PathBuf,
    pub verbose: bool,
    conveyor_config: ConveyorConfig,
}

impl Config {
    pub fn new(repo_dir: PathBuf, verbose: bool) -> Result<Self> {
        let conveyor_config = ConveyorConfig::with_cli_args(repo_dir, verbose)?;
        Ok(Self::from_conveyor_config(conveyor_config))
    }

    pub fn from_conveyor_config(conveyor_config: ConveyorConfig) -> Self {
        let toml = &conveyor_config.toml;
        Self {
            repo_dir: conveyor_config.repo_dir.clone(),
            log_dir: conveyor_config.log_dir(),
            lease_dir: conveyor_config.lease_dir(),
            claude_cmd: toml.claude_cmd(),
            bd_cmd: toml.bd_cmd(),
            skip_permissions: toml.skip_permissions(),
            sessions_dir: toml.sessions_dir(),
            verbose: conveyor_config.verbose,
            conveyor_config,
        }
    }

    pub fn conveyor_config(&self) -> &ConveyorConfig {
        &self.conveyor_config
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        std::fs::create_dir_all(&self.lease_dir).context("Failed to create lease directory")?;
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let toml = &self.conveyor_config.toml;
        let worktree_dir = if toml.defaults.worktree_dir.is_absolute() {
            toml.defaults.worktree_dir.clone()
        } else {
            self.repo_dir.join(&toml.defaults.worktree_dir)
        };
        EngineSettings {
            trunk: toml.defaults.trunk.clone(),
            remote: toml.defaults.remote.clone(),
            worktree_dir,
            branch_prefix: toml.defaults.branch_prefix.clone(),
            bd_cmd: self.bd_cmd.clone(),
            failure_policy: toml.on_agent_failure(),
            checks: toml.checks.clone(),
            lease_dir: Some(self.lease_dir.clone()),
            transcript_dir: toml.claude.transcripts.then(|| self.log_dir.clone()),
        }
    }

    /// Wire the `bd` store, git, and the Claude CLI into an engine for this repository.
    pub fn build_engine(&self) -> Engine {
        let toml = &self.conveyor_config.toml;
        let store = Arc::new(BeadsStore::new(self.bd_cmd.clone(), &self.repo_dir));
        let vcs = Arc::new(GitCli::new(&self.repo_dir));
        let runtime = Arc::new(
            ClaudeRuntime::new(self.claude_cmd.clone(), self.sessions_dir.clone())
                .with_skip_permissions(self.skip_permissions)
                .with_extra_args(toml.claude.extra_args.clone()),
        );
        Engine::new(store, vcs, runtime, self.engine_settings())
    }
}
