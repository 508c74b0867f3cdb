//! Jira side of a migration: paginated issue search, per-issue details and
//! the assignable-user list.

pub mod client;
pub mod types;

pub use client::JiraClient;
