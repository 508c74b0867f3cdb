//! TOML-based configuration for issuebridge.
//!
//! All secrets (API tokens) are stored as `_env` fields that reference
//! environment variable names. The actual secrets are resolved at runtime via
//! [`AppConfig::resolve_env_vars`]. Once loaded, the configuration is an
//! immutable value handed to the clients and the importer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything a migration run needs to know, read from one TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source Jira instance and project.
    pub jira: JiraConfig,

    /// Destination GitLab instance and project.
    pub gitlab: GitLabConfig,

    /// Jira user -> GitLab login mapping.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Field translation rules.
    #[serde(default)]
    pub import: ImportConfig,

    /// Retry policy for GitLab writes.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log level and optional log file.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Jira
// ---------------------------------------------------------------------------

/// Jira connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Base URL of the Jira instance (e.g. `https://acme.atlassian.net/`).
    pub url: String,

    /// Key of the project to import (e.g. `PROJ`).
    pub project: String,

    /// Account (usually an email address) used for basic auth.
    pub account: String,

    /// Environment variable holding the Jira API token.
    pub token_env: String,

    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Custom field that carries sprints / milestones.
    #[serde(default = "default_milestone_field")]
    pub milestone_field: String,

    /// Issues requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_milestone_field() -> String {
    "customfield_10000".into()
}
fn default_page_size() -> u32 {
    100
}

impl JiraConfig {
    /// Browser URL of an issue, used for the origin link in descriptions.
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.url.trim_end_matches('/'), key)
    }
}

// ---------------------------------------------------------------------------
// GitLab
// ---------------------------------------------------------------------------

/// GitLab connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance (e.g. `https://gitlab.example.com/`).
    pub url: String,

    /// Numeric id of the destination project.
    pub project_id: u64,

    /// Environment variable holding a personal access token. Impersonation
    /// requires a token of an administrator.
    pub token_env: String,

    /// Verify TLS certificates.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Act as the mapped author (`Sudo` header) when creating issues, notes
    /// and uploads. When off, authorship is written into the text instead.
    #[serde(default = "default_true")]
    pub sudo: bool,

    /// The instance supports typed issue links (`blocks`, `is_blocked_by`).
    #[serde(default)]
    pub premium: bool,

    /// Login used when a Jira user has no mapping.
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_user() -> String {
    "root".into()
}

impl GitLabConfig {
    /// REST API base URL.
    pub fn api_url(&self) -> String {
        format!("{}/api/v4", self.url.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What to do when a Jira user has no GitLab mapping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingUserPolicy {
    /// Ask the operator whether to continue with the default user.
    #[default]
    Prompt,
    /// Refuse to start the import.
    Abort,
    /// Continue silently with the default user.
    Proceed,
}

/// Identity mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Inline `"Jira Display Name" = "gitlab_login"` table.
    #[serde(default)]
    pub users: BTreeMap<String, String>,

    /// Optional TOML file with more mappings. Entries in the file override
    /// inline entries with the same display name.
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,

    /// Policy for unmapped users.
    #[serde(default)]
    pub on_missing: MissingUserPolicy,
}

// ---------------------------------------------------------------------------
// Import rules
// ---------------------------------------------------------------------------

/// How Jira fields are translated to GitLab fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Jira issue type -> value of the `type::` label.
    #[serde(default = "default_type_map")]
    pub type_map: BTreeMap<String, String>,

    /// Jira issue types created as GitLab incidents instead of issues.
    #[serde(default = "default_incident_types")]
    pub incident_types: Vec<String>,

    /// Jira status whose issues are closed after creation.
    #[serde(default = "default_done_status")]
    pub done_status: String,

    /// Attachment extensions embedded as images rather than linked.
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
}

fn default_type_map() -> BTreeMap<String, String> {
    [
        ("Bug", "bug"),
        ("Improvement", "improvement"),
        ("Spike", "spike"),
        ("Story", "story"),
        ("story", "story"),
        ("Task", "task"),
        ("Subtask", "subtask"),
        ("Epic", "epic"),
        ("epic", "epic"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_incident_types() -> Vec<String> {
    vec!["bug".into(), "Bug".into()]
}
fn default_done_status() -> String {
    "Done".into()
}
fn default_media_extensions() -> Vec<String> {
    [
        "jpeg", "jpg", "bmp", "png", "gif", "svg", "mp4", "mpeg", "mov", "avi", "mkv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            type_map: default_type_map(),
            incident_types: default_incident_types(),
            done_status: default_done_status(),
            media_extensions: default_media_extensions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient GitLab failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `issuebridge_core=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also append logs to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Parse the TOML file at `path`. Tokens stay unresolved until
    /// [`resolve_env_vars`](Self::resolve_env_vars) runs.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(jira = %config.jira.project, gitlab = config.gitlab.project_id, "configuration parsed");
        Ok(config)
    }

    /// Resolve the `*_env` token fields from environment variables.
    ///
    /// Both tokens are required to talk to the trackers, so a missing
    /// variable is an error.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.jira.token = Some(resolve_required_env(
            &self.jira.token_env,
            "jira.token_env",
        )?);
        self.gitlab.token = Some(resolve_required_env(
            &self.gitlab.token_env,
            "gitlab.token_env",
        )?);

        debug!("tokens resolved");
        Ok(())
    }

    /// Reject values that would only fail once the run has started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.jira.url.starts_with("http://") && !self.jira.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "jira.url".into(),
                detail: "Jira URL must start with http:// or https://".into(),
            });
        }
        if self.jira.project.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "jira.project".into(),
                detail: "Jira project key must not be empty".into(),
            });
        }
        if self.jira.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "jira.page_size".into(),
                detail: "page size must be > 0".into(),
            });
        }
        if !self.gitlab.url.starts_with("http://") && !self.gitlab.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.url".into(),
                detail: "GitLab URL must start with http:// or https://".into(),
            });
        }
        if self.gitlab.project_id == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.project_id".into(),
                detail: "GitLab project id must be > 0".into(),
            });
        }
        if self.gitlab.default_user.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "gitlab.default_user".into(),
                detail: "a fallback GitLab login is required".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".into(),
                detail: "at least one attempt is required".into(),
            });
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_delay_ms".into(),
                detail: "initial delay must not exceed max_delay_ms".into(),
            });
        }

        Ok(())
    }

    /// Parse, resolve tokens, validate.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Read an environment variable that must be set and non-empty.
fn resolve_required_env(env_name: &str, field: &str) -> Result<String, ConfigError> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Ok(val)
        }
        _ => {
            warn!(field, env_name, "env var not set or empty");
            Err(ConfigError::EnvVarMissing {
                var: env_name.to_string(),
                field: field.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[jira]
url = "https://acme.atlassian.net/"
project = "PROJ"
account = "migrator@acme.example"
token_env = "JIRA_TOKEN"
milestone_field = "customfield_10020"

[gitlab]
url = "https://gitlab.acme.example/"
project_id = 42
token_env = "GITLAB_TOKEN"
sudo = false
premium = true
default_user = "migration-bot"

[identity]
on_missing = "abort"

[identity.users]
"Jane Roe" = "jroe"
"Max Mustermann" = "max"

[import]
incident_types = ["Incident"]
done_status = "Closed"

[import.type_map]
Story = "feature"

[retry]
max_attempts = 5
initial_delay_ms = 100
max_delay_ms = 2000

[logging]
level = "debug"
file = "/tmp/issuebridge.log"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.jira.project, "PROJ");
        assert_eq!(config.jira.milestone_field, "customfield_10020");
        assert_eq!(config.gitlab.project_id, 42);
        assert!(!config.gitlab.sudo);
        assert!(config.gitlab.premium);
        assert_eq!(config.identity.on_missing, MissingUserPolicy::Abort);
        assert_eq!(config.identity.users["Jane Roe"], "jroe");
        assert_eq!(config.import.type_map.len(), 1);
        assert_eq!(config.import.done_status, "Closed");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.gitlab.default_user, "migration-bot");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_zero_project_id() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.gitlab.project_id = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "gitlab.project_id"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.jira.url = "acme.atlassian.net".into();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "jira.url"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_IB_JIRA_TOKEN", "jira-secret");
        std::env::set_var("TEST_IB_GITLAB_TOKEN", "glpat-abc");

        let toml_str = r#"
[jira]
url = "https://acme.atlassian.net"
project = "PROJ"
account = "a@b.c"
token_env = "TEST_IB_JIRA_TOKEN"
[gitlab]
url = "https://gitlab.example"
project_id = 1
token_env = "TEST_IB_GITLAB_TOKEN"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.jira.token.as_deref(), Some("jira-secret"));
        assert_eq!(config.gitlab.token.as_deref(), Some("glpat-abc"));

        std::env::remove_var("TEST_IB_JIRA_TOKEN");
        std::env::remove_var("TEST_IB_GITLAB_TOKEN");
    }

    #[test]
    fn test_resolve_env_vars_missing() {
        let toml_str = r#"
[jira]
url = "https://acme.atlassian.net"
project = "PROJ"
account = "a@b.c"
token_env = "TEST_IB_UNSET_JIRA_TOKEN"
[gitlab]
url = "https://gitlab.example"
project_id = 1
token_env = "TEST_IB_UNSET_GITLAB_TOKEN"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        let result = config.resolve_env_vars();
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "TEST_IB_UNSET_JIRA_TOKEN"
        ));
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[jira]
url = "https://acme.atlassian.net"
project = "PROJ"
account = "a@b.c"
token_env = "JIRA_TOKEN"
[gitlab]
url = "https://gitlab.example"
project_id = 7
token_env = "GITLAB_TOKEN"
"#;
        let config: AppConfig = toml::from_str(minimal).unwrap();
        assert!(config.jira.verify_ssl);
        assert_eq!(config.jira.milestone_field, "customfield_10000");
        assert_eq!(config.jira.page_size, 100);
        assert!(config.gitlab.sudo);
        assert!(!config.gitlab.premium);
        assert_eq!(config.gitlab.default_user, "root");
        assert_eq!(config.identity.on_missing, MissingUserPolicy::Prompt);
        assert_eq!(config.import.type_map["Story"], "story");
        assert_eq!(config.import.done_status, "Done");
        assert!(config.import.media_extensions.contains(&"png".to_string()));
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_urls() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(
            config.jira.browse_url("PROJ-7"),
            "https://acme.atlassian.net/browse/PROJ-7"
        );
        assert_eq!(config.gitlab.api_url(), "https://gitlab.acme.example/api/v4");
    }
}
