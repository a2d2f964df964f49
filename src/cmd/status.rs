//! Inspection commands: `conveyor status` and `conveyor phases`.

use anyhow::Result;
use std::path::PathBuf;

use conveyor::config::Config;
use conveyor::phase::Phase;

use super::super::Cli;

pub async fn cmd_status(cli: &Cli, repo_dir: PathBuf, issue_id: &str) -> Result<()> {
    let config = Config::new(repo_dir, cli.verbose)?;
    let engine = config.build_engine();
    let report = engine.status(issue_id).await?;
    let issue = &report.issue;

    println!();
    println!(
        "{} {}",
        console::style(&issue.id).bold().cyan(),
        console::style(&issue.title).bold()
    );
    println!("  status:    {}", issue.status.as_str());
    match report.phase_labels.as_slice() {
        [] => println!("  phase:     {}", console::style("none").dim()),
        [only] => println!("  phase:     {}", only),
        many => println!(
            "  phase:     {} {}",
            console::style(many.join(", ")).red(),
            console::style("(interrupted transition)").red()
        ),
    }
    match report.session_id {
        Some(ref id) => println!("  session:   {}", id),
        None => println!("  session:   {}", console::style("none yet").dim()),
    }
    println!(
        "  workspace: {} on {}{}",
        report.workspace.path.display(),
        report.workspace.branch,
        if report.workspace_exists {
            String::new()
        } else {
            console::style(" (not created)").dim().to_string()
        }
    );
    if report.open_blockers.is_empty() {
        println!("  blockers:  {}", console::style("none").dim());
    } else {
        println!("  blockers:");
        for blocker in &report.open_blockers {
            println!(
                "    {} {} [{}]",
                console::style(&blocker.id).yellow(),
                blocker.title,
                blocker.labels.join(", ")
            );
        }
    }
    println!();
    Ok(())
}

pub fn cmd_phases() {
    println!();
    println!(
        "{:<14} {:<18} {:<22} Next",
        "Phase", "Entry", "In progress"
    );
    println!(
        "{:<14} {:<18} {:<22} ----",
        "-----", "-----", "-----------"
    );
    for phase in Phase::ALL {
        let gate = if phase.is_human_gate() { " (human gate)" } else { "" };
        println!(
            "{:<14} {:<18} {:<22} {}{}",
            phase.name(),
            phase.entry_label(),
            phase.active_label().unwrap_or("-"),
            phase.next_label(),
            gate
        );
    }
    println!();
}
