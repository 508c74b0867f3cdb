//! issuebridge core library.
//!
//! This crate provides the components for moving the issues of a Jira
//! project into a GitLab project: configuration, the Jira and GitLab API
//! clients, identity mapping, markup translation, and the import
//! orchestrator.

pub mod config;
pub mod confirm;
pub mod errors;
pub mod gitlab;
pub mod identity;
pub mod importer;
pub mod jira;
pub mod markup;
pub mod models;
pub mod retry;
pub mod tracker;

// Re-exports for convenience.
pub use config::AppConfig;
pub use confirm::Confirmer;
pub use gitlab::GitLabClient;
pub use identity::IdentityMapper;
pub use importer::{reset_destination, ImportStats, Importer, LinkStats};
pub use jira::JiraClient;
pub use markup::MarkupTranslator;
pub use tracker::{IssueDestination, IssueSource};
