//! Group types for mailbag.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{MailbagError, Result};

/// Name of the group every identity belongs to.
pub const GROUP_ALL: &str = "All";

/// Name of the group of identities connected at least once this server session.
pub const GROUP_ALL_CONNECTED: &str = "AllConnected";

/// Name of the group of identities connected right now.
pub const GROUP_ALL_LOGIN: &str = "AllLogin";

/// Built-in dynamic group names. They count as taken for creation.
pub const RESERVED_GROUP_NAMES: &[&str] = &[GROUP_ALL, GROUP_ALL_CONNECTED, GROUP_ALL_LOGIN];

/// Maximum length of a user-created group name.
pub const MAX_GROUP_NAME_LENGTH: usize = 32;

/// Who may perform an action on a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionMode {
    /// Nobody, unless holding the override node.
    Never,
    /// Server operators.
    Op,
    /// The group owner.
    Owner,
    /// Group members.
    Member,
    /// Anybody.
    Everyone,
}

impl PermissionMode {
    /// Persisted string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Never => "NEVER",
            PermissionMode::Op => "OP",
            PermissionMode::Owner => "OWNER",
            PermissionMode::Member => "MEMBER",
            PermissionMode::Everyone => "EVERYONE",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEVER" => Ok(PermissionMode::Never),
            "OP" => Ok(PermissionMode::Op),
            "OWNER" => Ok(PermissionMode::Owner),
            "MEMBER" => Ok(PermissionMode::Member),
            "EVERYONE" => Ok(PermissionMode::Everyone),
            _ => Err(format!("unknown permission mode: {s}")),
        }
    }
}

/// Where a group comes from and how its membership is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// Created by a user and stored on disk.
    Persisted,
    /// Every identity. Membership is always true and never enumerated.
    AllIdentities,
    /// Identities connected at least once this server session.
    AllEverConnected,
    /// Identities connected right now.
    AllCurrentlyConnected,
    /// A group synthesized from an external group provider.
    Imported {
        /// Tag of the provider the group came from.
        provider: String,
    },
}

/// A named, addressable set of identities.
///
/// Dynamic groups are snapshots: their member set was computed when the
/// group was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub kind: GroupKind,
    pub name: String,
    pub owner: String,
    pub members: BTreeSet<String>,
    pub send_mode: PermissionMode,
    pub modify_mode: PermissionMode,
    pub dissolution_mode: PermissionMode,
}

impl Group {
    /// Create a persisted group. The owner becomes the first member.
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        send_mode: PermissionMode,
        modify_mode: PermissionMode,
        dissolution_mode: PermissionMode,
    ) -> Self {
        let owner = owner.into();
        let mut members = BTreeSet::new();
        members.insert(owner.clone());
        Self {
            kind: GroupKind::Persisted,
            name: name.into(),
            owner,
            members,
            send_mode,
            modify_mode,
            dissolution_mode,
        }
    }

    /// Create a dynamic group snapshot. Modify and dissolve are never allowed.
    pub fn dynamic(
        kind: GroupKind,
        name: impl Into<String>,
        owner: impl Into<String>,
        members: BTreeSet<String>,
        send_mode: PermissionMode,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            owner: owner.into(),
            members,
            send_mode,
            modify_mode: PermissionMode::Never,
            dissolution_mode: PermissionMode::Never,
        }
    }

    /// Check if `key` belongs to the group.
    pub fn is_member(&self, key: &str) -> bool {
        match self.kind {
            GroupKind::AllIdentities => true,
            _ => self.members.contains(key),
        }
    }

    /// Enumerable member list. Empty for the all-identities group.
    pub fn members(&self) -> Vec<String> {
        match self.kind {
            GroupKind::AllIdentities => Vec::new(),
            _ => self.members.iter().cloned().collect(),
        }
    }

    /// Whether membership is computed rather than stored.
    pub fn is_dynamic(&self) -> bool {
        self.kind != GroupKind::Persisted
    }

    /// Storage key: the lower-cased name.
    pub fn key(&self) -> String {
        group_key(&self.name)
    }
}

/// Storage key of a group name.
pub fn group_key(name: &str) -> String {
    name.to_lowercase()
}

/// Check if `name` is one of the built-in dynamic group names.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_GROUP_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Validate a user-supplied group name.
///
/// Allowed characters are ASCII letters, digits, `_` and `-`.
pub fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MailbagError::Validation(
            "group name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(MailbagError::Validation(format!(
            "group name must be at most {MAX_GROUP_NAME_LENGTH} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MailbagError::Validation(format!(
            "group name contains invalid characters: {name}"
        )));
    }
    Ok(())
}
