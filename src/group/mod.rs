//! Group module for mailbag.
//!
//! This module provides mail groups including:
//! - Persisted user groups with owner, members and permission modes
//! - Built-in dynamic groups (`All`, `AllConnected`, `AllLogin`)
//! - Groups imported from external providers
//! - Permission evaluation for send, modify and dissolve

mod permission;
mod provider;
mod registry;
mod repository;
mod types;

pub use permission::{
    GroupAction, PermissionPolicy, NODE_CREATE_INFINITY, NODE_DISSOLUTION_ALL, NODE_MODIFY_ALL,
    NODE_SEND_ALL,
};
pub use provider::{imported_name, split_imported_name, GroupProvider, IMPORT_SEPARATOR};
pub use registry::GroupRegistry;
pub use repository::GroupRepository;
pub use types::{
    group_key, is_reserved_name, validate_group_name, Group, GroupKind, PermissionMode,
    GROUP_ALL, GROUP_ALL_CONNECTED, GROUP_ALL_LOGIN, MAX_GROUP_NAME_LENGTH,
    RESERVED_GROUP_NAMES,
};
