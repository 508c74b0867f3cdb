//! Jira wiki markup → GitLab Markdown translation.

pub mod rules;
pub mod substitutions;
pub mod translator;

pub use rules::{default_rules, Rule};
pub use substitutions::{Substitution, Substitutions};
pub use translator::MarkupTranslator;
