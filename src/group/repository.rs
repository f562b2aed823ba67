//! Group repository for mailbag.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{group_key, Group, GroupKind, PermissionMode};
use crate::storage;
use crate::{MailbagError, Result};

/// On-disk shape of a group record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGroup {
    name: String,
    owner: String,
    #[serde(default)]
    members: Vec<String>,
    send_mode: PermissionMode,
    modify_mode: PermissionMode,
    dissolution_mode: PermissionMode,
}

/// Repository for persisted groups, one JSON file per lower-cased name.
pub struct GroupRepository {
    dir: PathBuf,
}

impl GroupRepository {
    /// Open the repository rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        storage::ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the group files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save (create or overwrite) a group.
    pub fn save(&self, group: &Group) -> Result<()> {
        if group.is_dynamic() {
            return Err(MailbagError::Validation(format!(
                "dynamic group {} cannot be persisted",
                group.name
            )));
        }

        let stored = StoredGroup {
            name: group.name.clone(),
            owner: group.owner.clone(),
            members: group.members.iter().cloned().collect(),
            send_mode: group.send_mode,
            modify_mode: group.modify_mode,
            dissolution_mode: group.dissolution_mode,
        };
        let content = serde_json::to_vec_pretty(&stored)?;
        let path = storage::record_path(&self.dir, &group.key());
        storage::write_atomic(&path, &content)?;
        debug!("Saved group {} to {:?}", group.name, path);
        Ok(())
    }

    /// Delete a group file. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        storage::remove_record(&storage::record_path(&self.dir, &group_key(name)))
    }

    /// Load every persisted group.
    ///
    /// Malformed files are logged and skipped.
    pub fn load_all(&self) -> Result<Vec<Group>> {
        let mut groups = Vec::new();
        for path in storage::list_records(&self.dir)? {
            let loaded = storage::read_record(&path).and_then(|content| match content {
                Some(content) => Self::decode(&content).map(Some),
                None => Ok(None),
            });
            match loaded {
                Ok(Some(group)) => groups.push(group),
                Ok(None) => {}
                Err(e) => warn!("Skipping group file {:?}: {}", path, e),
            }
        }
        Ok(groups)
    }

    fn decode(content: &[u8]) -> Result<Group> {
        let stored: StoredGroup = serde_json::from_slice(content)?;
        if stored.name.is_empty() {
            return Err(MailbagError::MalformedRecord(
                "stored group has an empty name".to_string(),
            ));
        }
        Ok(Group {
            kind: GroupKind::Persisted,
            name: stored.name,
            owner: stored.owner,
            members: stored.members.into_iter().collect(),
            send_mode: stored.send_mode,
            modify_mode: stored.modify_mode,
            dissolution_mode: stored.dissolution_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, GroupRepository) {
        let temp_dir = TempDir::new().unwrap();
        let repo = GroupRepository::new(temp_dir.path().join("group")).unwrap();
        (temp_dir, repo)
    }

    fn sample() -> Group {
        let mut group = Group::new(
            "Builders",
            "alice",
            PermissionMode::Member,
            PermissionMode::Owner,
            PermissionMode::Op,
        );
        group.members.insert("bob".to_string());
        group
    }

    #[test]
    fn test_save_and_load() {
        let (_temp_dir, repo) = setup_repo();
        let group = sample();
        repo.save(&group).unwrap();

        assert!(repo.dir().join("builders.json").exists());
        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded, vec![group]);
    }

    #[test]
    fn test_persisted_field_names() {
        let (_temp_dir, repo) = setup_repo();
        repo.save(&sample()).unwrap();

        let raw: Value =
            serde_json::from_slice(&fs::read(repo.dir().join("builders.json")).unwrap()).unwrap();
        assert_eq!(raw["name"], "Builders");
        assert_eq!(raw["owner"], "alice");
        assert_eq!(raw["sendMode"], "MEMBER");
        assert_eq!(raw["modifyMode"], "OWNER");
        assert_eq!(raw["dissolutionMode"], "OP");
        assert_eq!(raw["members"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_delete() {
        let (_temp_dir, repo) = setup_repo();
        repo.save(&sample()).unwrap();
        assert!(repo.delete("BUILDERS").unwrap());
        assert!(!repo.delete("builders").unwrap());
        assert!(repo.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_refuses_dynamic() {
        let (_temp_dir, repo) = setup_repo();
        let group = Group::dynamic(
            GroupKind::AllIdentities,
            "All",
            "x",
            BTreeSet::new(),
            PermissionMode::Op,
        );
        assert!(matches!(
            repo.save(&group),
            Err(MailbagError::Validation(_))
        ));
    }

    #[test]
    fn test_load_all_skips_malformed() {
        let (_temp_dir, repo) = setup_repo();
        repo.save(&sample()).unwrap();
        fs::write(repo.dir().join("broken.json"), b"not json").unwrap();
        fs::write(
            repo.dir().join("badmode.json"),
            br#"{"name":"x","owner":"o","sendMode":"SOMETIMES","modifyMode":"OP","dissolutionMode":"OP"}"#,
        )
        .unwrap();

        let groups = repo.load_all().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Builders");
    }
}
