//! The external user mapping file.
//!
//! Large Jira instances have more users than fit comfortably in the main
//! configuration, so the mapping can live in its own file:
//!
//! ```toml
//! [users]
//! "Jane Roe" = "jroe"
//! "Max Mustermann" = "mmustermann"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::IdentityError;

/// On-disk layout: a single `[users]` table of display name -> login.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MappingFileData {
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

/// Reads and writes the user mapping file.
pub struct MappingFile;

impl MappingFile {
    /// Display name -> login entries of the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, String>, IdentityError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IdentityError::MappingFileError {
                path: path.display().to_string(),
                detail: "no such file".into(),
            });
        }

        let data: MappingFileData = toml::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| IdentityError::ParseError(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), count = data.users.len(), "read user mapping file");
        Ok(data.users)
    }

    /// Replace the file at `path` with `users`.
    pub fn save<P: AsRef<Path>>(
        path: P,
        users: &BTreeMap<String, String>,
    ) -> Result<(), IdentityError> {
        let path = path.as_ref();
        let data = MappingFileData {
            users: users.clone(),
        };
        let text =
            toml::to_string_pretty(&data).map_err(|e| IdentityError::ParseError(e.to_string()))?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), count = users.len(), "wrote user mapping file");
        Ok(())
    }

    /// Add an entry pointing at `login` for every name of `names` the file
    /// does not map yet, creating the file if needed. Existing entries are
    /// kept. Returns the number of entries added.
    pub fn add_missing<'a, P: AsRef<Path>>(
        path: P,
        names: impl IntoIterator<Item = &'a str>,
        login: &str,
    ) -> Result<usize, IdentityError> {
        let path = path.as_ref();
        let mut users = if path.exists() {
            Self::load(path)?
        } else {
            BTreeMap::new()
        };

        let before = users.len();
        for name in names {
            users
                .entry(name.to_string())
                .or_insert_with(|| login.to_string());
        }
        let added = users.len() - before;
        if added > 0 {
            Self::save(path, &users)?;
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_users_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(
            &path,
            "[users]\n\"Jane Roe\" = \"jroe\"\n\"Max Mustermann\" = \"mmustermann\"\n",
        )
        .unwrap();

        let users = MappingFile::load(&path).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["Max Mustermann"], "mmustermann");
    }

    #[test]
    fn test_written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        let users = BTreeMap::from([("Bob Builder".to_string(), "bob".to_string())]);

        MappingFile::save(&path, &users).unwrap();
        assert_eq!(MappingFile::load(&path).unwrap(), users);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(matches!(
            MappingFile::load("/nonexistent/users.toml"),
            Err(IdentityError::MappingFileError { .. })
        ));
    }

    #[test]
    fn test_empty_file_maps_nobody() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(&path, "").unwrap();

        assert!(MappingFile::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(&path, "[users\n").unwrap();

        assert!(matches!(
            MappingFile::load(&path),
            Err(IdentityError::ParseError(_))
        ));
    }

    #[test]
    fn test_add_missing_keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(&path, "[users]\n\"Jane Roe\" = \"jroe\"\n").unwrap();

        let added =
            MappingFile::add_missing(&path, ["Jane Roe", "Erika Muster"], "root").unwrap();
        assert_eq!(added, 1);

        let users = MappingFile::load(&path).unwrap();
        assert_eq!(users["Jane Roe"], "jroe");
        assert_eq!(users["Erika Muster"], "root");
    }

    #[test]
    fn test_add_missing_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");

        assert_eq!(MappingFile::add_missing(&path, ["A", "B"], "root").unwrap(), 2);
        assert_eq!(MappingFile::load(&path).unwrap().len(), 2);
    }
}
