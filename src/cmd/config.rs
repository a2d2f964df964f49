//! Configuration view and validation commands: `conveyor config`.

use anyhow::{Context, Result};
use std::path::Path;

use conveyor::conveyor_config::{ConveyorConfig, ConveyorToml};

use super::super::ConfigCommands;

fn print_option(key: &str, value: &Option<String>) {
    match value {
        Some(v) => println!("  {} = \"{}\"", key, v),
        None => println!("  {} = {}", key, console::style("(unset)").dim()),
    }
}

fn print_toml(toml: &ConveyorToml) {
    println!("[defaults]");
    println!("  trunk = \"{}\"", toml.defaults.trunk);
    println!("  remote = \"{}\"", toml.defaults.remote);
    println!("  worktree_dir = \"{}\"", toml.defaults.worktree_dir.display());
    println!("  branch_prefix = \"{}\"", toml.defaults.branch_prefix);
    println!("  skip_permissions = {}", toml.defaults.skip_permissions);
    println!("  on_agent_failure = \"{}\"", toml.on_agent_failure());
    println!();
    println!("[checks]");
    print_option("format", &toml.checks.format);
    print_option("lint", &toml.checks.lint);
    print_option("typecheck", &toml.checks.typecheck);
    println!();
    println!("[claude]");
    println!("  extra_args = {:?}", toml.claude.extra_args);
    println!("  transcripts = {}", toml.claude.transcripts);
    println!();
}

pub fn cmd_config(repo_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let conveyor_dir = repo_dir.join(".conveyor");
    let config_path = conveyor_dir.join("conveyor.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Conveyor Configuration").bold());
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No conveyor.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let config = ConveyorConfig::new(repo_dir.to_path_buf())?;
            print_toml(&config.toml);

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", config.toml.claude_cmd());
            println!("  bd_cmd = \"{}\"", config.toml.bd_cmd());
            println!("  skip_permissions = {}", config.toml.skip_permissions());
            println!("  sessions_dir = \"{}\"", config.toml.sessions_dir().display());
            println!();

            if !config_path.exists() {
                println!("Run 'conveyor config init' to create a conveyor.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No conveyor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ConveyorToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("conveyor.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&conveyor_dir).with_context(|| {
                format!("Failed to create {}", conveyor_dir.display())
            })?;
            ConveyorToml::default().save(&config_path)?;

            println!("Created conveyor.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] trunk, remote, on_agent_failure");
            println!("  - [checks] format, lint, typecheck commands");
            println!("  - [claude] extra_args, transcripts");
            println!();
        }
    }

    Ok(())
}
