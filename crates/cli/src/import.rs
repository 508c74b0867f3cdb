//! Import and reset commands with progress visualization.

use std::time::Duration;

use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use issuebridge_core::confirm::{AssumeYes, Confirmer};
use issuebridge_core::errors::ImportError;
use issuebridge_core::importer::ResetStats;
use issuebridge_core::{reset_destination, AppConfig, ImportStats, Importer, IssueSource, LinkStats};

use super::{connect_clients, style};

/// Asks the operator on the terminal. A prompt that cannot be shown (no
/// TTY) counts as a refusal.
struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "could not read confirmation, treating as no");
                false
            }
        }
    }
}

/// Run the import command.
pub async fn run_import(config: &AppConfig, yes: bool, issue: Option<&str>) -> Result<()> {
    if yes {
        import(config, &AssumeYes, issue).await
    } else {
        import(config, &TerminalConfirmer, issue).await
    }
}

/// Run the reset command.
pub async fn run_reset(config: &AppConfig, yes: bool) -> Result<()> {
    let (_, gitlab) = connect_clients(config)?;
    let result = if yes {
        reset_destination(&gitlab, &AssumeYes).await
    } else {
        reset_destination(&gitlab, &TerminalConfirmer).await
    };

    let stats: ResetStats = match result {
        Ok(stats) => stats,
        Err(ImportError::Declined) => {
            println!("{}", style::warn("Reset cancelled. Nothing was deleted."));
            return Ok(());
        }
        Err(e) => return Err(e).context("reset failed"),
    };

    println!();
    println!("{}", style::success("Destination project emptied"));
    println!("{}", style::count("Issues deleted", stats.issues_deleted, false));
    println!(
        "{}",
        style::count("Milestones deleted", stats.milestones_deleted, false)
    );
    println!("{}", style::count("Failed", stats.failed, true));
    println!();
    Ok(())
}

async fn import(config: &AppConfig, confirmer: &impl Confirmer, issue: Option<&str>) -> Result<()> {
    let (jira, gitlab) = connect_clients(config)?;

    println!();
    println!("Importing {} ({})...", config.jira.project, style::direction());
    println!();

    let mut importer = match Importer::connect(&jira, &gitlab, config, confirmer).await {
        Ok(importer) => importer,
        Err(ImportError::Declined) => return cancelled(),
        Err(e) => return Err(e).context("failed to prepare the import"),
    };

    let reading = spinner()?;
    reading.set_message(format!("Reading issues of {}...", config.jira.project));
    let issues = jira.issues().await;
    reading.finish_and_clear();
    let issues = issues.context("failed to read Jira issues")?;

    match importer.confirm_import(&issues, issue, confirmer) {
        Ok(()) => {}
        Err(ImportError::Declined) => return cancelled(),
        Err(ImportError::NothingToImport) => {
            println!(
                "{}",
                style::warn(&format!("Jira project {} has no issues. Nothing to do.", config.jira.project))
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("import was not started"),
    }

    let spinner = spinner()?;
    let (stats, links) = match issue {
        Some(key) => {
            spinner.set_message(format!("Importing {} and its references...", key));
            let result = importer.import_one(&issues, key).await;
            spinner.finish_and_clear();
            result.context("import failed")?
        }
        None => {
            spinner.set_message(format!("Creating {} issue(s)...", issues.len()));
            let stats = importer.import_all(&issues).await;
            spinner.set_message("Linking issues...");
            let links = importer.link_all(&issues).await;
            spinner.finish_and_clear();
            (stats, links)
        }
    };

    print_summary(&importer.project().web_url, &stats, &links, importer.milestones().len());
    if stats.failed > 0 {
        anyhow::bail!("{} issue(s) could not be imported", stats.failed);
    }
    Ok(())
}

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .context("invalid progress template")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn cancelled() -> Result<()> {
    println!("{}", style::warn("Import cancelled. Nothing was written."));
    Ok(())
}

fn print_summary(web_url: &str, stats: &ImportStats, links: &LinkStats, milestones: usize) {
    if stats.failed == 0 {
        println!("{}", style::success("Import complete!"));
    } else {
        println!("{}", style::error("Import finished with failures"));
    }
    println!("{}", style::count("Issues imported", stats.imported, false));
    println!("{}", style::count("Issues failed", stats.failed, true));
    println!("{}", style::count("Warnings", stats.warnings, true));
    println!(
        "{}",
        style::count("Fallback users", stats.fallback_users, false)
    );
    println!("{}", style::count("Milestones", milestones, false));
    println!("{}", style::count("Links created", links.created, false));
    println!(
        "{}",
        style::count("Links skipped", links.skipped_unresolved, false)
    );
    println!("{}", style::count("Links failed", links.failed, true));
    println!("  Project           : {}", web_url);
    println!();
    if stats.failed > 0 || stats.warnings > 0 || stats.fallback_users > 0 {
        println!(
            "{}",
            style::dim("See the log for details. Run 'issuebridge reset' before re-running.")
        );
        println!();
    }
}
