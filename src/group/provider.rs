//! External group providers.
//!
//! A provider exposes groups managed by some other system (a permissions
//! plugin, a guild system). Groups flagged for mail are imported as dynamic
//! groups named `"{tag}:{group}"`.

/// Source of imported groups.
pub trait GroupProvider: Send + Sync {
    /// Short tag identifying the provider, used as the name prefix.
    fn tag(&self) -> &str;

    /// Names of the provider's groups carrying any of `flags`.
    fn groups_with_flag(&self, flags: &[String]) -> Vec<String>;

    /// Value of a provider-side option of a group.
    fn group_option(&self, group: &str, option: &str) -> Option<String>;

    /// Identity keys of the group's members.
    fn members_of(&self, group: &str) -> Vec<String>;
}

/// Separator between provider tag and group name.
pub const IMPORT_SEPARATOR: char = ':';

/// Full name of an imported group.
pub fn imported_name(tag: &str, group: &str) -> String {
    format!("{tag}{IMPORT_SEPARATOR}{group}")
}

/// Split an imported group name into provider tag and group name.
pub fn split_imported_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(IMPORT_SEPARATOR)
}
