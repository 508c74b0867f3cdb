//! Errors of the issuebridge core.
//!
//! One `thiserror` enum per subsystem. [`CoreError`] wraps any of them when a
//! caller does not care which side failed.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Any core error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Jira(#[from] JiraError),

    #[error(transparent)]
    GitLab(#[from] GitLabError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Markup(#[from] MarkupError),
}

// ---------------------------------------------------------------------------
// Jira API errors
// ---------------------------------------------------------------------------

/// Errors from the Jira REST API (the read side of a migration).
#[derive(Debug, Error)]
pub enum JiraError {
    /// Request never got a response.
    #[error("Jira HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-2xx answer.
    #[error("Jira API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Account or API token rejected.
    #[error("Jira authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The response body did not have the expected shape.
    #[error("Jira response parse error: {0}")]
    ParseError(String),
}

impl JiraError {
    /// Server errors, rate limiting, timeouts and connection failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::ApiError { status, .. } => *status >= 500 || *status == 429,
            Self::AuthenticationFailed(_) | Self::ParseError(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// GitLab API errors
// ---------------------------------------------------------------------------

/// Errors from GitLab REST API interactions (the write side of a migration).
#[derive(Debug, Error)]
pub enum GitLabError {
    /// Transport failure: DNS, connect, TLS or timeout.
    #[error("GitLab HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-2xx answer not covered by a more specific variant.
    #[error("GitLab API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Token unresolved, rejected (401) or lacking rights (403).
    #[error("GitLab authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The destination project does not exist or is not visible to the token.
    #[error("GitLab project not found: {0}")]
    ProjectNotFound(String),

    /// HTTP 429.
    #[error("GitLab rate limit exceeded, retry after {retry_after}")]
    RateLimited { retry_after: String },

    /// Unexpected response body.
    #[error("GitLab response parse error: {0}")]
    ParseError(String),
}

impl GitLabError {
    /// Whether the failure is worth retrying: server errors, rate limiting,
    /// timeouts and connection failures. Every other 4xx is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::ApiError { status, .. } => *status >= 500,
            Self::RateLimited { .. } => true,
            Self::AuthenticationFailed(_) | Self::ProjectNotFound(_) | Self::ParseError(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Problems with the TOML configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A `*_env` field names a variable that is unset or empty.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// Parsed fine but fails [`AppConfig::validate`](crate::config::AppConfig::validate).
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error("cannot read configuration: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

/// Problems mapping Jira users to GitLab members.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Missing or unreadable mapping file.
    #[error("mapping file '{path}': {detail}")]
    MappingFileError { path: String, detail: String },

    #[error("malformed mapping file: {0}")]
    ParseError(String),

    /// The configured fallback user is not a member of the GitLab project.
    #[error("default user '{0}' is not a member of the GitLab project")]
    DefaultUserNotMember(String),

    /// Source users without a destination mapping, under a fail-closed policy.
    #[error("{} Jira user(s) have no GitLab mapping: {}", .0.len(), .0.join(", "))]
    UnmappedUsers(Vec<String>),

    #[error("cannot read mapping file: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Markup errors
// ---------------------------------------------------------------------------

/// Errors from building translation rules and substitutions.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// A rule or substitution pattern is not a valid regular expression.
    #[error("invalid markup pattern '{pattern}': {detail}")]
    InvalidPattern { pattern: String, detail: String },
}

// ---------------------------------------------------------------------------
// Import errors
// ---------------------------------------------------------------------------

/// Errors that stop an import run as a whole.
///
/// Failures of individual issues are not represented here: they are
/// recorded in the run statistics and the run moves on.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The operator declined a confirmation prompt.
    #[error("aborted by operator")]
    Declined,

    /// The source project has no issues to import.
    #[error("no Jira issues to import")]
    NothingToImport,

    /// The requested source issue is not part of the loaded set.
    #[error("Jira issue {0} is not part of the imported set")]
    UnknownIssue(String),

    #[error("import source error: {0}")]
    Jira(#[from] JiraError),

    #[error("import destination error: {0}")]
    GitLab(#[from] GitLabError),

    #[error("import identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("import markup error: {0}")]
    Markup(#[from] MarkupError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitLabError::ApiError {
            status: 409,
            body: "Issue(s) already assigned".into(),
        };
        assert_eq!(
            err.to_string(),
            "GitLab API error (HTTP 409): Issue(s) already assigned"
        );

        let err = ConfigError::EnvVarMissing {
            var: "GITLAB_TOKEN".into(),
            field: "gitlab.token_env".into(),
        };
        assert!(err.to_string().contains("GITLAB_TOKEN"));

        let err = IdentityError::UnmappedUsers(vec!["Jane Roe".into(), "Max Mustermann".into()]);
        assert_eq!(
            err.to_string(),
            "2 Jira user(s) have no GitLab mapping: Jane Roe, Max Mustermann"
        );
    }

    #[test]
    fn test_transient_classification() {
        let server = GitLabError::ApiError {
            status: 502,
            body: String::new(),
        };
        assert!(server.is_transient());

        let conflict = GitLabError::ApiError {
            status: 409,
            body: String::new(),
        };
        assert!(!conflict.is_transient());

        assert!(GitLabError::RateLimited {
            retry_after: "10".into()
        }
        .is_transient());
        assert!(!GitLabError::AuthenticationFailed("HTTP 401".into()).is_transient());

        assert!(JiraError::ApiError {
            status: 429,
            body: String::new(),
        }
        .is_transient());
        assert!(!JiraError::ApiError {
            status: 404,
            body: String::new(),
        }
        .is_transient());
        assert!(!JiraError::ParseError("bad".into()).is_transient());
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ImportError::Declined.into();
        assert!(matches!(err, CoreError::Import(ImportError::Declined)));

        let err: CoreError = JiraError::ParseError("bad".into()).into();
        assert!(matches!(err, CoreError::Jira(_)));
    }
}
