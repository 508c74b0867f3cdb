//! issuebridge command-line tool.
//!
//! Moves the issues of a Jira project into a GitLab project. Besides the
//! import itself it provides subcommands for generating and validating the
//! configuration, checking the user mapping, previewing the markup
//! translation, and emptying the destination project before a re-run.

mod import;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use issuebridge_core::config::{AppConfig, LoggingConfig};
use issuebridge_core::identity::{IdentityMapper, MappingFile};
use issuebridge_core::markup::{MarkupTranslator, Substitutions};
use issuebridge_core::{GitLabClient, IssueDestination, IssueSource, JiraClient};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Jira to GitLab issue migration.
#[derive(Parser, Debug)]
#[command(
    name = "issuebridge",
    version,
    about = "Import the issues of a Jira project into a GitLab project"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./issuebridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./issuebridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Inspect the Jira user -> GitLab login mapping.
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Print the GitLab Markdown rendition of a Jira markup file.
    Translate {
        /// File containing Jira wiki markup.
        file: PathBuf,
    },

    /// Import the Jira project into the GitLab project.
    Import {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Import only this issue (key such as PROJ-12, or numeric id) and
        /// the issues it references.
        #[arg(long)]
        issue: Option<String>,
    },

    /// Delete every issue and milestone of the GitLab project.
    Reset {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum IdentityAction {
    /// List every assignable Jira user and the GitLab member it maps to.
    Check {
        /// Write unmapped users into this mapping file, pointing at the
        /// default user, for editing.
        #[arg(long)]
        write_missing: Option<PathBuf>,
    },
    /// Show the GitLab member a Jira display name maps to.
    Lookup {
        /// Jira display name.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => {
            let _guard = init_logging(&quiet_logging())?;
            cmd_init(&output)
        }
        Commands::Validate => {
            let _guard = init_logging(&quiet_logging())?;
            cmd_validate(&cli.config)
        }
        Commands::Translate { file } => {
            let _guard = init_logging(&quiet_logging())?;
            cmd_translate(&file)
        }
        command => {
            let config = load_config(&cli.config)?;
            let _guard = init_logging(&config.logging)?;

            match command {
                Commands::Identity { action } => cmd_identity(&config, action).await,
                Commands::Import { yes, issue } => {
                    import::run_import(&config, yes, issue.as_deref()).await
                }
                Commands::Reset { yes } => import::run_reset(&config, yes).await,
                Commands::Init { .. } | Commands::Validate | Commands::Translate { .. } => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Logging & config helpers
// ---------------------------------------------------------------------------

fn quiet_logging() -> LoggingConfig {
    LoggingConfig {
        level: "warn".into(),
        file: None,
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured
/// level. The returned guard flushes the log file when dropped.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("invalid log level '{}'", logging.level))?;
    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            Ok(None)
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn connect_clients(config: &AppConfig) -> Result<(JiraClient, GitLabClient)> {
    let jira = JiraClient::new(&config.jira).context("failed to create Jira client")?;
    let gitlab = GitLabClient::new(&config.gitlab).context("failed to create GitLab client")?;
    Ok((jira, gitlab))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"# issuebridge configuration
# Secrets are never stored here: every *_env field names an environment
# variable holding the value.

[jira]
url = "https://example.atlassian.net/"
project = "PROJ"
account = "migration@example.com"
token_env = "JIRA_TOKEN"
verify_ssl = true
# Custom field carrying sprints.
milestone_field = "customfield_10000"
page_size = 100

[gitlab]
url = "https://gitlab.example.com/"
project_id = 1
# Impersonation (sudo = true) needs an administrator token.
token_env = "GITLAB_TOKEN"
verify_ssl = true
sudo = true
# Typed links (blocks / is blocked by). Without it every link is "relates to".
premium = false
# Login used for Jira users without a mapping.
default_user = "root"

[identity]
# prompt | abort | proceed
on_missing = "prompt"
# mapping_file = "users.toml"

[identity.users]
# "Jane Roe" = "jroe"

[import]
done_status = "Done"
incident_types = ["Bug", "bug"]
media_extensions = ["jpeg", "jpg", "bmp", "png", "gif", "svg", "mp4", "mpeg", "mov", "avi", "mkv"]

[import.type_map]
Bug = "bug"
Improvement = "improvement"
Spike = "spike"
Story = "story"
Task = "task"
Subtask = "subtask"
Epic = "epic"

[retry]
max_attempts = 3
initial_delay_ms = 500
max_delay_ms = 10000

[logging]
level = "info"
# file = "issuebridge.log"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your Jira and GitLab details");
    println!("  2. Export the referenced environment variables (JIRA_TOKEN, GITLAB_TOKEN)");
    println!(
        "  3. Validate with: issuebridge validate --config {}",
        output.display()
    );
    println!(
        "  4. Check the user mapping: issuebridge identity check --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    match config.resolve_env_vars() {
        Ok(()) => println!("  {}", style::success("Tokens resolved from the environment")),
        Err(e) => println!("  {}", style::warn(&e.to_string())),
    }

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {}", e)));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    let set = |token: &Option<String>| if token.is_some() { "set" } else { "NOT SET" };
    println!();
    println!("{}", style::header("Configuration summary"));
    println!("  Direction      : {}", style::direction());
    println!("  Jira URL       : {}", config.jira.url);
    println!("  Jira project   : {}", config.jira.project);
    println!("  Jira account   : {}", config.jira.account);
    println!("  Jira token     : {}", set(&config.jira.token));
    println!("  GitLab URL     : {}", config.gitlab.url);
    println!("  GitLab project : {}", config.gitlab.project_id);
    println!("  GitLab token   : {}", set(&config.gitlab.token));
    println!("  Impersonation  : {}", config.gitlab.sudo);
    println!("  Typed links    : {}", config.gitlab.premium);
    println!("  Default user   : {}", config.gitlab.default_user);
    println!("  Mapped users   : {}", config.identity.users.len());
    println!("  Unmapped users : {:?}", config.identity.on_missing);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_translate(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let translator = MarkupTranslator::new().context("failed to compile translation rules")?;
    println!("{}", translator.translate(text.as_str(), &Substitutions::new()));
    Ok(())
}

async fn cmd_identity(config: &AppConfig, action: IdentityAction) -> Result<()> {
    let (jira, gitlab) = connect_clients(config)?;
    let members = gitlab
        .members()
        .await
        .context("failed to list GitLab project members")?;
    let mapper = IdentityMapper::new(&config.identity, &config.gitlab.default_user, members)
        .context("failed to initialize identity mapper")?;

    match action {
        IdentityAction::Lookup { name } => {
            match mapper.lookup(&name) {
                Some(user) => {
                    println!("Jira user   : {}", name);
                    println!("GitLab login: {}", user.login);
                    println!("GitLab id   : {}", user.id);
                }
                None => {
                    println!(
                        "{}",
                        style::warn(&format!(
                            "'{}' is not mapped, falls back to '{}'",
                            name,
                            mapper.default_user().login
                        ))
                    );
                }
            }
            Ok(())
        }

        IdentityAction::Check { write_missing } => {
            let users = jira.users().await.context("failed to list Jira users")?;

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Jira user", "Account id", "GitLab login", "Status"]);
            for user in &users {
                let (login, status) = match mapper.lookup(&user.display_name) {
                    Some(member) => (
                        member.login.as_str(),
                        Cell::new("✓ mapped").fg(comfy_table::Color::Green),
                    ),
                    None => (
                        mapper.default_user().login.as_str(),
                        Cell::new("⚠ default").fg(comfy_table::Color::Yellow),
                    ),
                };
                table.add_row(vec![
                    Cell::new(&user.display_name),
                    Cell::new(&user.account_id),
                    Cell::new(login),
                    status,
                ]);
            }

            println!();
            println!("{}", style::header("Identity mapping"));
            println!();
            println!("{}", table);
            println!();

            let unmapped = mapper.unmapped(&users);
            if unmapped.is_empty() {
                println!("{}", style::success("All Jira users are mapped"));
                return Ok(());
            }
            println!(
                "{}",
                style::warn(&format!(
                    "{} of {} Jira user(s) fall back to '{}'",
                    unmapped.len(),
                    users.len(),
                    mapper.default_user().login
                ))
            );

            if let Some(path) = write_missing {
                let added = MappingFile::add_missing(
                    &path,
                    unmapped.iter().map(|u| u.display_name.as_str()),
                    &mapper.default_user().login,
                )
                .context("failed to update mapping file")?;
                println!(
                    "{}",
                    style::success(&format!("Added {} user(s) to {}", added, path.display()))
                );
                println!(
                    "{}",
                    style::dim("Edit the logins, then set identity.mapping_file to this file.")
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_flags() {
        let cli = Cli::parse_from(["issuebridge", "import", "--yes", "--issue", "PROJ-7"]);
        assert_eq!(cli.config, PathBuf::from("./issuebridge.toml"));
        match cli.command {
            Commands::Import { yes, issue } => {
                assert!(yes);
                assert_eq!(issue.as_deref(), Some("PROJ-7"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issuebridge.toml");
        cmd_init(&path).unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.jira.token_env, "JIRA_TOKEN");
        assert_eq!(config.gitlab.default_user, "root");
        assert_eq!(config.import.type_map["Story"], "story");

        assert!(cmd_init(&path).is_err(), "init must not overwrite");
    }
}
