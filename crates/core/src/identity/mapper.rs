//! Core identity mapping logic.
//!
//! [`IdentityMapper`] translates Jira display names into GitLab project
//! members, falling back to a configured default user.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use super::mapping_file::MappingFile;
use crate::config::{IdentityConfig, MissingUserPolicy};
use crate::confirm::Confirmer;
use crate::errors::IdentityError;
use crate::markup::{Substitution, Substitutions};
use crate::models::{DestinationUser, SourceUser};

/// Jira display name -> GitLab member mapper.
#[derive(Debug, Clone)]
pub struct IdentityMapper {
    /// Display name -> login, inline table merged with the mapping file.
    table: BTreeMap<String, String>,
    /// Project members by login.
    members: HashMap<String, DestinationUser>,
    default_user: DestinationUser,
}

impl IdentityMapper {
    /// Create a mapper from an [`IdentityConfig`] and the destination
    /// project's members.
    ///
    /// The mapping file, if configured and present, is loaded immediately;
    /// its entries override inline entries. `default_login` must be one of
    /// `members`.
    pub fn new(
        config: &IdentityConfig,
        default_login: &str,
        members: Vec<DestinationUser>,
    ) -> Result<Self, IdentityError> {
        info!(members = members.len(), "initializing identity mapper");

        let mut table = config.users.clone();
        match &config.mapping_file {
            Some(path) if path.exists() => {
                table.extend(MappingFile::load(path)?);
            }
            Some(path) => {
                warn!(path = %path.display(), "mapping file not found, using inline users only");
            }
            None => {
                debug!("no mapping file configured");
            }
        }

        let members: HashMap<String, DestinationUser> = members
            .into_iter()
            .map(|m| (m.login.clone(), m))
            .collect();

        let default_user = members
            .get(default_login)
            .cloned()
            .ok_or_else(|| IdentityError::DefaultUserNotMember(default_login.to_string()))?;

        for (name, login) in &table {
            if !members.contains_key(login) {
                warn!(jira_user = %name, login = %login, "mapped login is not a project member");
            }
        }

        Ok(Self {
            table,
            members,
            default_user,
        })
    }

    /// The explicitly mapped member for `display_name`, if any.
    pub fn lookup(&self, display_name: &str) -> Option<&DestinationUser> {
        self.table
            .get(display_name)
            .and_then(|login| self.members.get(login))
    }

    /// Map a Jira display name to a GitLab member, falling back to the
    /// default user.
    pub fn resolve(&self, display_name: &str) -> &DestinationUser {
        match self.lookup(display_name) {
            Some(user) => user,
            None => {
                debug!(display_name, fallback = %self.default_user.login, "using default user");
                &self.default_user
            }
        }
    }

    pub fn default_user(&self) -> &DestinationUser {
        &self.default_user
    }

    /// Source users that would fall back to the default user.
    pub fn unmapped<'a>(&self, users: &'a [SourceUser]) -> Vec<&'a SourceUser> {
        users
            .iter()
            .filter(|u| self.lookup(&u.display_name).is_none())
            .collect()
    }

    /// `[~accountid:ID]` -> `@login` entries for every source user.
    pub fn mention_substitutions(&self, users: &[SourceUser]) -> Substitutions {
        let mut substitutions = Substitutions::new();
        for user in users {
            let mention = format!("[~accountid:{}]", user.account_id);
            let login = &self.resolve(&user.display_name).login;
            match Substitution::literal(&mention, format!("@{}", login)) {
                Ok(s) => substitutions.insert(s),
                Err(e) => warn!(error = %e, "skipping mention substitution"),
            }
        }
        debug!(count = substitutions.len(), "built mention substitutions");
        substitutions
    }

    /// Apply the miss policy to the unmapped users among `users`.
    pub fn check(
        &self,
        users: &[SourceUser],
        policy: MissingUserPolicy,
        confirmer: &impl Confirmer,
    ) -> Result<(), IdentityError> {
        let unmapped: Vec<String> = self
            .unmapped(users)
            .into_iter()
            .map(|u| u.display_name.clone())
            .collect();
        if unmapped.is_empty() {
            info!("all Jira users are mapped");
            return Ok(());
        }

        match policy {
            MissingUserPolicy::Proceed => {
                warn!(
                    count = unmapped.len(),
                    fallback = %self.default_user.login,
                    "unmapped Jira users will be attributed to the default user"
                );
                Ok(())
            }
            MissingUserPolicy::Abort => Err(IdentityError::UnmappedUsers(unmapped)),
            MissingUserPolicy::Prompt => {
                let prompt = format!(
                    "{} Jira user(s) have no GitLab mapping ({}) and will be attributed to '{}'. Continue?",
                    unmapped.len(),
                    unmapped.join(", "),
                    self.default_user.login
                );
                if confirmer.confirm(&prompt) {
                    Ok(())
                } else {
                    Err(IdentityError::UnmappedUsers(unmapped))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AssumeNo, AssumeYes};

    fn member(id: u64, login: &str) -> DestinationUser {
        DestinationUser {
            id,
            login: login.into(),
        }
    }

    fn source(name: &str, account: &str) -> SourceUser {
        SourceUser {
            display_name: name.into(),
            account_id: account.into(),
        }
    }

    fn members() -> Vec<DestinationUser> {
        vec![member(1, "root"), member(2, "jroe"), member(3, "mmuster")]
    }

    fn config() -> IdentityConfig {
        let mut users = BTreeMap::new();
        users.insert("Jane Roe".to_string(), "jroe".to_string());
        users.insert("Ghost".to_string(), "departed".to_string());
        IdentityConfig {
            users,
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_mapped_and_fallback() {
        let mapper = IdentityMapper::new(&config(), "root", members()).unwrap();
        assert_eq!(mapper.resolve("Jane Roe").login, "jroe");
        assert_eq!(mapper.resolve("Nobody").login, "root");
        // Mapped, but not a member of the project.
        assert_eq!(mapper.resolve("Ghost").login, "root");
    }

    #[test]
    fn test_default_user_must_be_member() {
        let result = IdentityMapper::new(&config(), "admin", members());
        assert!(matches!(result, Err(IdentityError::DefaultUserNotMember(_))));
    }

    #[test]
    fn test_mapping_file_overrides_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(&path, "[users]\n\"Jane Roe\" = \"mmuster\"\n").unwrap();

        let mut config = config();
        config.mapping_file = Some(path);
        let mapper = IdentityMapper::new(&config, "root", members()).unwrap();
        assert_eq!(mapper.resolve("Jane Roe").login, "mmuster");
    }

    #[test]
    fn test_missing_mapping_file_is_tolerated() {
        let mut config = config();
        config.mapping_file = Some("/nonexistent/users.toml".into());
        let mapper = IdentityMapper::new(&config, "root", members()).unwrap();
        assert_eq!(mapper.resolve("Jane Roe").login, "jroe");
    }

    #[test]
    fn test_unmapped_users() {
        let mapper = IdentityMapper::new(&config(), "root", members()).unwrap();
        let users = vec![source("Jane Roe", "a1"), source("Ghost", "a2"), source("New", "a3")];
        let names: Vec<&str> = mapper
            .unmapped(&users)
            .iter()
            .map(|u| u.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["Ghost", "New"]);
    }

    #[test]
    fn test_mention_substitutions() {
        let mapper = IdentityMapper::new(&config(), "root", members()).unwrap();
        let subs = mapper.mention_substitutions(&[source("Jane Roe", "5b10a"), source("New", "77c")]);
        assert_eq!(subs.len(), 2);
        assert_eq!(
            subs.apply("[~accountid:5b10a] and [~accountid:77c]"),
            "@jroe and @root"
        );
    }

    #[test]
    fn test_check_policies() {
        let mapper = IdentityMapper::new(&config(), "root", members()).unwrap();
        let users = vec![source("Jane Roe", "a1"), source("New", "a3")];

        assert!(mapper.check(&users, MissingUserPolicy::Proceed, &AssumeNo).is_ok());
        assert!(matches!(
            mapper.check(&users, MissingUserPolicy::Abort, &AssumeYes),
            Err(IdentityError::UnmappedUsers(ref names)) if names == &vec!["New".to_string()]
        ));
        assert!(mapper.check(&users, MissingUserPolicy::Prompt, &AssumeYes).is_ok());
        assert!(mapper.check(&users, MissingUserPolicy::Prompt, &AssumeNo).is_err());

        let mapped = vec![source("Jane Roe", "a1")];
        assert!(mapper.check(&mapped, MissingUserPolicy::Abort, &AssumeNo).is_ok());
    }
}
