//! Phase execution commands: `conveyor phase` and `conveyor tick`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use conveyor::config::Config;
use conveyor::engine::{BatchReport, PhaseOutcome};
use conveyor::phase::Phase;

use super::super::Cli;

/// Split an `ID` or `ID:TITLE` argument. The title is informational only.
pub fn parse_issue_arg(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once(':') {
        Some((id, title)) => (id.trim(), Some(title.trim()).filter(|t| !t.is_empty())),
        None => (arg.trim(), None),
    }
}

fn load_config(cli: &Cli, repo_dir: PathBuf) -> Result<Config> {
    let config = Config::new(repo_dir, cli.verbose)?;
    config.ensure_directories()?;
    for warning in config.conveyor_config().validate() {
        tracing::warn!(%warning, "configuration");
    }
    Ok(config)
}

pub async fn cmd_phase(cli: &Cli, repo_dir: PathBuf, phase: &str, issues: &[String]) -> Result<()> {
    // reject a bad phase name before anything else is touched
    let phase: Phase = phase.parse()?;
    let config = load_config(cli, repo_dir)?;
    let engine = config.build_engine();

    let ids: Vec<String> = issues
        .iter()
        .map(|arg| {
            let (id, title) = parse_issue_arg(arg);
            if let Some(title) = title {
                tracing::debug!(issue_id = id, title, "queued");
            }
            id.to_string()
        })
        .filter(|id| !id.is_empty())
        .collect();

    let report = engine.run_phase(phase, &ids).await;
    finish(&report)
}

pub async fn cmd_tick(cli: &Cli, repo_dir: PathBuf, phase: &str) -> Result<()> {
    let phase: Phase = phase.parse()?;
    let config = load_config(cli, repo_dir)?;
    let engine = config.build_engine();
    let report = engine
        .tick(phase)
        .await
        .with_context(|| format!("Failed to list candidates for phase '{}'", phase))?;
    finish(&report)
}

fn finish(report: &BatchReport) -> Result<()> {
    print_report(report);
    let failures = report.failures();
    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} issue(s) failed in phase '{}'",
            failures.len(),
            report.results.len(),
            report.phase
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    println!(
        "{} {}",
        console::style("Phase").bold(),
        console::style(report.phase).bold().cyan()
    );
    if report.results.is_empty() {
        println!("  {}", console::style("no eligible issues").dim());
    }
    for result in &report.results {
        let outcome = result.outcome.to_string();
        let styled = match result.outcome {
            PhaseOutcome::Advanced { .. } => console::style(outcome).green(),
            PhaseOutcome::AwaitingInput { .. } | PhaseOutcome::AwaitingApproval { .. } => {
                console::style(outcome).yellow()
            }
            PhaseOutcome::Skipped { .. } => console::style(outcome).dim(),
            PhaseOutcome::Halted { .. } | PhaseOutcome::Escalated { .. } => {
                console::style(outcome).magenta()
            }
            PhaseOutcome::Held { .. } | PhaseOutcome::Failed { .. } => {
                console::style(outcome).red().bold()
            }
        };
        println!("  {:<16} {}", result.issue_id, styled);
    }
    println!();
}
