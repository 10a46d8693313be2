//! Subject directory (the roster).
//!
//! Read-only lookup from a subject id to display details. The roster file
//! is a JSON array:
//!
//! ```json
//! [
//!   { "id": "MHS001", "name": "Jane Smith", "affiliation": "Informatics" },
//!   { "npm": "MHS002", "name": "John Doe", "program": "Computer Science" }
//! ]
//! ```
//!
//! `npm` and `program` are accepted as aliases for `id` and `affiliation`.
//! When an id appears more than once the first entry wins.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use rollcall_core::SubjectId;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Display details for a known subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub affiliation: String,
}

/// Lookup of subject details by id.
///
/// Implementations must be safe to share between connection tasks.
pub trait Directory: Send + Sync {
    fn lookup(&self, subject: &SubjectId) -> Option<Profile>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read roster {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse roster {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    #[serde(alias = "npm")]
    id: String,
    name: String,
    #[serde(alias = "program", default)]
    affiliation: String,
}

/// Directory backed by a JSON roster loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct RosterDirectory {
    entries: HashMap<SubjectId, Profile>,
}

impl RosterDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the roster file. A missing file yields an empty directory.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Roster file not found, directory is empty");
                return Ok(Self::empty());
            }
            Err(source) => {
                return Err(DirectoryError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let directory = Self::from_json(&text).map_err(|source| DirectoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            subjects = directory.entries.len(),
            "Roster loaded"
        );
        Ok(directory)
    }

    /// Parses a roster document.
    ///
    /// Entries whose id is not a valid subject id are skipped.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<RosterEntry> = serde_json::from_str(text)?;
        Ok(Self::from_entries(raw))
    }

    fn from_entries(raw: Vec<RosterEntry>) -> Self {
        let mut entries = HashMap::with_capacity(raw.len());
        for entry in raw {
            let subject = match SubjectId::new(&entry.id) {
                Ok(subject) => subject,
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "Skipping roster entry");
                    continue;
                }
            };
            if entries.contains_key(&subject) {
                debug!(subject = %subject, "Duplicate roster entry ignored");
                continue;
            }
            entries.insert(
                subject,
                Profile {
                    name: entry.name,
                    affiliation: entry.affiliation,
                },
            );
        }
        Self { entries }
    }
}

impl Directory for RosterDirectory {
    fn lookup(&self, subject: &SubjectId) -> Option<Profile> {
        self.entries.get(subject).cloned()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    #[test]
    fn test_lookup() {
        let dir = RosterDirectory::from_json(
            r#"[{"id": "MHS001", "name": "Jane Smith", "affiliation": "Informatics"}]"#,
        )
        .unwrap();
        assert_eq!(
            dir.lookup(&id("MHS001")),
            Some(Profile {
                name: "Jane Smith".to_string(),
                affiliation: "Informatics".to_string(),
            })
        );
        assert_eq!(dir.lookup(&id("MHS999")), None);
    }

    #[test]
    fn test_legacy_field_names() {
        let dir = RosterDirectory::from_json(
            r#"[{"npm": "2106123456", "name": "John Doe", "program": "Computer Science"}]"#,
        )
        .unwrap();
        let profile = dir.lookup(&id("2106123456")).unwrap();
        assert_eq!(profile.affiliation, "Computer Science");
    }

    #[test]
    fn test_first_duplicate_wins() {
        let dir = RosterDirectory::from_json(
            r#"[
                {"id": "A1", "name": "First", "affiliation": "X"},
                {"id": "A1", "name": "Second", "affiliation": "Y"}
            ]"#,
        )
        .unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.lookup(&id("A1")).unwrap().name, "First");
    }

    #[test]
    fn test_invalid_ids_skipped() {
        let dir = RosterDirectory::from_json(
            r#"[
                {"id": "", "name": "Nobody"},
                {"id": "THIS-ID-IS-FAR-TOO-LONG", "name": "Long"},
                {"id": "OK1", "name": "Fine"}
            ]"#,
        )
        .unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.lookup(&id("OK1")).unwrap().affiliation, "");
    }

    #[test]
    fn test_escaped_strings() {
        let dir = RosterDirectory::from_json(
            r#"[{"id": "Q1", "name": "Anne \"Q\" O'Neil", "affiliation": "Dept\\Lab"}]"#,
        )
        .unwrap();
        let profile = dir.lookup(&id("Q1")).unwrap();
        assert_eq!(profile.name, "Anne \"Q\" O'Neil");
        assert_eq!(profile.affiliation, "Dept\\Lab");
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RosterDirectory::load(&tmp.path().join("roster.json")).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("roster.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RosterDirectory::load(&path),
            Err(DirectoryError::Parse { .. })
        ));
    }
}
