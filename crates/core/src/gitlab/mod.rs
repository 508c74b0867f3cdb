//! GitLab side of a migration.

pub mod client;

pub use client::GitLabClient;
