//! Group registry for mailbag.
//!
//! Persisted groups are held in memory and written through to the
//! [`GroupRepository`]. Built-in and imported groups are computed on every
//! lookup and never stored.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::permission::{GroupAction, PermissionPolicy};
use super::provider::{imported_name, split_imported_name, GroupProvider};
use super::repository::GroupRepository;
use super::types::{
    group_key, is_reserved_name, validate_group_name, Group, GroupKind, PermissionMode, GROUP_ALL,
    GROUP_ALL_CONNECTED, GROUP_ALL_LOGIN,
};
use crate::config::GroupConfig;
use crate::sender::{MailSender, CONSOLE_KEY};
use crate::session::SessionRegistry;
use crate::{MailbagError, Result};

/// Catalog of every addressable group.
pub struct GroupRegistry {
    repo: GroupRepository,
    sessions: SessionRegistry,
    config: GroupConfig,
    providers: Vec<Arc<dyn GroupProvider>>,
    /// Persisted groups keyed by lower-cased name.
    groups: RwLock<HashMap<String, Group>>,
}

impl GroupRegistry {
    /// Open a registry and load every persisted group.
    pub fn open(
        repo: GroupRepository,
        sessions: SessionRegistry,
        config: GroupConfig,
        providers: Vec<Arc<dyn GroupProvider>>,
    ) -> Result<Self> {
        let groups = Self::index(repo.load_all()?);
        info!("Loaded {} group(s) from {:?}", groups.len(), repo.dir());
        Ok(Self {
            repo,
            sessions,
            config,
            providers,
            groups: RwLock::new(groups),
        })
    }

    fn index(groups: Vec<Group>) -> HashMap<String, Group> {
        let mut map = HashMap::with_capacity(groups.len());
        for group in groups {
            let key = group.key();
            if map.contains_key(&key) {
                warn!("Ignoring duplicate group {}", group.name);
                continue;
            }
            map.insert(key, group);
        }
        map
    }

    fn persist(&self, group: &Group) {
        if let Err(e) = self.repo.save(group) {
            error!("Failed to save group {}: {}", group.name, e);
        }
    }

    /// Create a persisted group owned by `owner`.
    ///
    /// The owner becomes the first member and the modes come from the
    /// configured defaults.
    pub async fn create(&self, name: &str, owner: &str) -> Result<Group> {
        self.insert(name, owner, |_| Ok(())).await
    }

    /// Create a persisted group owned by `requester`, within their creation
    /// quota.
    ///
    /// The quota is counted under the same lock as the insert.
    pub async fn create_within_quota(
        &self,
        requester: &dyn MailSender,
        name: &str,
    ) -> Result<Group> {
        let owner = requester.identity_key();
        let limit = self.config.max_create;
        self.insert(name, &owner, |groups| {
            let owned = groups.values().filter(|g| g.owner == owner).count();
            if PermissionPolicy::can_create(requester, owned, limit) {
                Ok(())
            } else {
                Err(MailbagError::Permission(format!(
                    "{} may not create more than {} group(s)",
                    requester.name(),
                    limit
                )))
            }
        })
        .await
    }

    async fn insert(
        &self,
        name: &str,
        owner: &str,
        allowed: impl FnOnce(&HashMap<String, Group>) -> Result<()>,
    ) -> Result<Group> {
        validate_group_name(name)?;

        let mut groups = self.groups.write().await;
        allowed(&groups)?;
        let key = group_key(name);
        if is_reserved_name(name) || groups.contains_key(&key) {
            return Err(MailbagError::DuplicateGroupName(name.to_string()));
        }

        let group = Group::new(
            name,
            owner,
            self.config.default_send_mode,
            self.config.default_modify_mode,
            self.config.default_dissolution_mode,
        );
        self.persist(&group);
        groups.insert(key, group.clone());
        info!("Group {} created by {}", name, owner);
        Ok(group)
    }

    /// Look up any group by name, case-insensitively.
    pub async fn get(&self, name: &str) -> Result<Group> {
        if let Some(group) = self.builtin(name).await {
            return Ok(group);
        }
        if let Some(group) = self.groups.read().await.get(&group_key(name)) {
            return Ok(group.clone());
        }
        self.imported(name)
            .ok_or_else(|| MailbagError::NotFound(format!("group {name}")))
    }

    /// Dissolve a persisted group.
    pub async fn remove(&self, name: &str) -> Result<Group> {
        let mut groups = self.groups.write().await;
        let removed = match groups.remove(&group_key(name)) {
            Some(group) => group,
            None => return Err(self.missing_persisted(name)),
        };
        if let Err(e) = self.repo.delete(&removed.name) {
            error!("Failed to delete group file of {}: {}", removed.name, e);
        }
        info!("Group {} dissolved", removed.name);
        Ok(removed)
    }

    /// Every addressable group: built-ins, persisted groups sorted by name,
    /// then imported groups.
    pub async fn list_all(&self) -> Vec<Group> {
        let mut result = Vec::new();
        for name in [GROUP_ALL, GROUP_ALL_CONNECTED, GROUP_ALL_LOGIN] {
            if let Some(group) = self.builtin(name).await {
                result.push(group);
            }
        }

        let mut persisted: Vec<Group> = self.groups.read().await.values().cloned().collect();
        persisted.sort_by_key(|g| g.key());
        result.extend(persisted);

        result.extend(self.imported_groups());
        result
    }

    /// Check if a name is taken by any group, case-insensitively.
    pub async fn exists_name(&self, name: &str) -> bool {
        is_reserved_name(name)
            || self.groups.read().await.contains_key(&group_key(name))
            || self.imported(name).is_some()
    }

    /// Add a member to a persisted group.
    ///
    /// Returns `false` if the identity was already a member.
    pub async fn add_member(&self, name: &str, key: &str) -> Result<bool> {
        let max_members = self.config.max_members;
        self.modify(name, |group| {
            if group.members.contains(key) {
                return Ok(false);
            }
            if group.members.len() >= max_members {
                return Err(MailbagError::Validation(format!(
                    "group {} already has {} members",
                    group.name, max_members
                )));
            }
            group.members.insert(key.to_string());
            Ok(true)
        })
        .await
    }

    /// Remove a member from a persisted group.
    ///
    /// Returns `false` if the identity was not a member.
    pub async fn remove_member(&self, name: &str, key: &str) -> Result<bool> {
        self.modify(name, |group| Ok(group.members.remove(key))).await
    }

    /// Change one of a persisted group's permission modes.
    pub async fn set_mode(
        &self,
        name: &str,
        action: GroupAction,
        mode: PermissionMode,
    ) -> Result<()> {
        self.modify(name, |group| {
            match action {
                GroupAction::Send => group.send_mode = mode,
                GroupAction::Modify => group.modify_mode = mode,
                GroupAction::Dissolve => group.dissolution_mode = mode,
            }
            Ok(())
        })
        .await
    }

    /// Hand a persisted group over to another owner.
    pub async fn set_owner(&self, name: &str, owner: &str) -> Result<()> {
        self.modify(name, |group| {
            group.owner = owner.to_string();
            Ok(())
        })
        .await
    }

    /// Persisted groups `key` belongs to, sorted by name.
    pub async fn groups_of(&self, key: &str) -> Vec<Group> {
        let mut result: Vec<Group> = self
            .groups
            .read()
            .await
            .values()
            .filter(|g| g.is_member(key))
            .cloned()
            .collect();
        result.sort_by_key(|g| g.key());
        result
    }

    /// Number of persisted groups owned by `owner`.
    pub async fn count_owned_by(&self, owner: &str) -> usize {
        self.groups
            .read()
            .await
            .values()
            .filter(|g| g.owner == owner)
            .count()
    }

    /// Check if `requester` may create another group.
    pub async fn can_create(&self, requester: &dyn MailSender) -> bool {
        let owned = self.count_owned_by(&requester.identity_key()).await;
        PermissionPolicy::can_create(requester, owned, self.config.max_create)
    }

    /// Number of persisted groups.
    pub async fn count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Every identity that is a member of some persisted group.
    pub async fn persisted_members(&self) -> BTreeSet<String> {
        self.groups
            .read()
            .await
            .values()
            .flat_map(|g| g.members.iter().cloned())
            .collect()
    }

    /// Re-read every persisted group.
    ///
    /// The in-memory state is replaced only once loading succeeded.
    pub async fn reload(&self) -> Result<usize> {
        let mut groups = self.groups.write().await;
        let loaded = Self::index(self.repo.load_all()?);
        let count = loaded.len();
        *groups = loaded;
        info!("Reloaded {} group(s)", count);
        Ok(count)
    }

    /// Apply an edit to a persisted group and write it through.
    ///
    /// All edits are serialized by the registry's write lock. A failed edit
    /// leaves the group unchanged.
    async fn modify<R>(
        &self,
        name: &str,
        edit: impl FnOnce(&mut Group) -> Result<R>,
    ) -> Result<R> {
        let mut groups = self.groups.write().await;
        let group = match groups.get_mut(&group_key(name)) {
            Some(group) => group,
            None => return Err(self.missing_persisted(name)),
        };

        let mut edited = group.clone();
        let result = edit(&mut edited)?;
        if edited != *group {
            *group = edited;
            self.persist(group);
            debug!("Group {} updated", group.name);
        }
        Ok(result)
    }

    /// Error for a name that is not a persisted group.
    fn missing_persisted(&self, name: &str) -> MailbagError {
        if is_reserved_name(name) || self.imported(name).is_some() {
            MailbagError::Validation(format!("group {name} is computed and cannot be changed"))
        } else {
            MailbagError::NotFound(format!("group {name}"))
        }
    }

    async fn builtin(&self, name: &str) -> Option<Group> {
        let (kind, canonical, members, send_mode) = if name.eq_ignore_ascii_case(GROUP_ALL) {
            (
                GroupKind::AllIdentities,
                GROUP_ALL,
                BTreeSet::new(),
                self.config.all_send_mode,
            )
        } else if name.eq_ignore_ascii_case(GROUP_ALL_CONNECTED) {
            (
                GroupKind::AllEverConnected,
                GROUP_ALL_CONNECTED,
                self.sessions.ever_connected_keys().await.into_iter().collect(),
                self.config.all_connected_send_mode,
            )
        } else if name.eq_ignore_ascii_case(GROUP_ALL_LOGIN) {
            (
                GroupKind::AllCurrentlyConnected,
                GROUP_ALL_LOGIN,
                self.sessions.connected_keys().await.into_iter().collect(),
                self.config.all_login_send_mode,
            )
        } else {
            return None;
        };
        Some(Group::dynamic(kind, canonical, CONSOLE_KEY, members, send_mode))
    }

    fn imported(&self, name: &str) -> Option<Group> {
        let (tag, group_name) = split_imported_name(name)?;
        let provider = self
            .providers
            .iter()
            .find(|p| p.tag().eq_ignore_ascii_case(tag))?;
        let flagged = provider.groups_with_flag(&self.config.import_flags);
        let found = flagged
            .iter()
            .find(|g| g.eq_ignore_ascii_case(group_name))?;
        Some(self.build_imported(provider.as_ref(), found))
    }

    fn imported_groups(&self) -> Vec<Group> {
        let mut result = Vec::new();
        for provider in &self.providers {
            for group_name in provider.groups_with_flag(&self.config.import_flags) {
                result.push(self.build_imported(provider.as_ref(), &group_name));
            }
        }
        result
    }

    fn build_imported(&self, provider: &dyn GroupProvider, group_name: &str) -> Group {
        let send_mode = provider
            .group_option(group_name, &self.config.import_send_mode_option)
            .and_then(|value| match value.parse::<PermissionMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!("Group {}:{}: {}", provider.tag(), group_name, e);
                    None
                }
            })
            .unwrap_or(self.config.import_default_send_mode);

        Group::dynamic(
            GroupKind::Imported {
                provider: provider.tag().to_string(),
            },
            imported_name(provider.tag(), group_name),
            CONSOLE_KEY,
            provider.members_of(group_name).into_iter().collect(),
            send_mode,
        )
    }
}
