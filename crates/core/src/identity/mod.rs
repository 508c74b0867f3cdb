//! Identity mapping from Jira users to GitLab project members.
//!
//! The mapping hierarchy is:
//! 1. TOML mapping file (highest priority)
//! 2. Inline `[identity.users]` table
//! 3. Fallback: the configured default GitLab user

pub mod mapper;
pub mod mapping_file;

pub use mapper::IdentityMapper;
pub use mapping_file::MappingFile;
