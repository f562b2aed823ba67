//! Configuration module for mailbag.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::group::PermissionMode;
use crate::{MailbagError, Result};

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persisted mails and groups.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "data".to_string()
}

impl StorageConfig {
    /// Directory holding one file per delivered mail.
    pub fn mail_dir(&self) -> PathBuf {
        Path::new(&self.path).join("mail")
    }

    /// Directory holding one file per persisted group.
    pub fn group_dir(&self) -> PathBuf {
        Path::new(&self.path).join("group")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/mailbag.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Timezone for displaying dates (e.g., "Asia/Tokyo", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Maximum number of addresses on a draft: recipients plus group names.
    #[serde(default = "default_max_destinations")]
    pub max_destinations: usize,
    /// Number of slots in a draft attachment box.
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
    /// Maximum number of message lines per mail.
    #[serde(default = "default_max_message_lines")]
    pub max_message_lines: usize,
    /// Minimum seconds between two sends by the same identity (0 = off).
    #[serde(default)]
    pub spam_protection_secs: u64,
    /// Tell identities about unread mail when they connect.
    #[serde(default = "default_notify_unread")]
    pub notify_unread_on_connect: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_destinations() -> usize {
    10
}

fn default_max_attachments() -> usize {
    18
}

fn default_max_message_lines() -> usize {
    15
}

fn default_notify_unread() -> bool {
    true
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            max_destinations: default_max_destinations(),
            max_attachments: default_max_attachments(),
            max_message_lines: default_max_message_lines(),
            spam_protection_secs: 0,
            notify_unread_on_connect: default_notify_unread(),
        }
    }
}

/// Group configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Number of groups a single owner may create.
    #[serde(default = "default_max_create")]
    pub max_create: usize,
    /// Maximum number of members in a persisted group.
    #[serde(default = "default_max_members")]
    pub max_members: usize,
    /// Send mode given to newly created groups.
    #[serde(default = "default_send_mode")]
    pub default_send_mode: PermissionMode,
    /// Modify mode given to newly created groups.
    #[serde(default = "default_owner_mode")]
    pub default_modify_mode: PermissionMode,
    /// Dissolution mode given to newly created groups.
    #[serde(default = "default_owner_mode")]
    pub default_dissolution_mode: PermissionMode,
    /// Send mode of the built-in `All` group.
    #[serde(default = "default_special_send_mode")]
    pub all_send_mode: PermissionMode,
    /// Send mode of the built-in `AllConnected` group.
    #[serde(default = "default_special_send_mode")]
    pub all_connected_send_mode: PermissionMode,
    /// Send mode of the built-in `AllLogin` group.
    #[serde(default = "default_special_send_mode")]
    pub all_login_send_mode: PermissionMode,
    /// Provider-side flags marking a group as a mail destination.
    #[serde(default = "default_import_flags")]
    pub import_flags: Vec<String>,
    /// Provider-side option holding an imported group's send mode.
    #[serde(default = "default_import_send_mode_option")]
    pub import_send_mode_option: String,
    /// Send mode used when the provider option is absent or invalid.
    #[serde(default = "default_send_mode")]
    pub import_default_send_mode: PermissionMode,
}

fn default_max_create() -> usize {
    5
}

fn default_max_members() -> usize {
    100
}

fn default_send_mode() -> PermissionMode {
    PermissionMode::Member
}

fn default_owner_mode() -> PermissionMode {
    PermissionMode::Owner
}

fn default_special_send_mode() -> PermissionMode {
    PermissionMode::Op
}

fn default_import_flags() -> Vec<String> {
    vec!["mail-receive".to_string()]
}

fn default_import_send_mode_option() -> String {
    "mail-send-mode".to_string()
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            max_create: default_max_create(),
            max_members: default_max_members(),
            default_send_mode: default_send_mode(),
            default_modify_mode: default_owner_mode(),
            default_dissolution_mode: default_owner_mode(),
            all_send_mode: default_special_send_mode(),
            all_connected_send_mode: default_special_send_mode(),
            all_login_send_mode: default_special_send_mode(),
            import_flags: default_import_flags(),
            import_send_mode_option: default_import_send_mode_option(),
            import_default_send_mode: default_send_mode(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Mail configuration.
    #[serde(default)]
    pub mail: MailConfig,
    /// Group configuration.
    #[serde(default)]
    pub group: GroupConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MailbagError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MailbagError::Config(format!("config parse error: {e}")))
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - The draft attachment box has no slots
    /// - A mail may not have any recipient
    pub fn validate(&self) -> Result<()> {
        if self.mail.max_attachments == 0 {
            return Err(MailbagError::Config(
                "mail.max_attachments must be at least 1".to_string(),
            ));
        }
        if self.mail.max_destinations == 0 {
            return Err(MailbagError::Config(
                "mail.max_destinations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.storage.path, "data");
        assert_eq!(config.storage.mail_dir(), Path::new("data").join("mail"));
        assert_eq!(config.storage.group_dir(), Path::new("data").join("group"));

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/mailbag.log");

        assert_eq!(config.mail.timezone, "UTC");
        assert_eq!(config.mail.max_destinations, 10);
        assert_eq!(config.mail.max_attachments, 18);
        assert_eq!(config.mail.max_message_lines, 15);
        assert_eq!(config.mail.spam_protection_secs, 0);
        assert!(config.mail.notify_unread_on_connect);

        assert_eq!(config.group.max_create, 5);
        assert_eq!(config.group.max_members, 100);
        assert_eq!(config.group.default_send_mode, PermissionMode::Member);
        assert_eq!(config.group.default_modify_mode, PermissionMode::Owner);
        assert_eq!(config.group.default_dissolution_mode, PermissionMode::Owner);
        assert_eq!(config.group.all_send_mode, PermissionMode::Op);
        assert_eq!(config.group.all_connected_send_mode, PermissionMode::Op);
        assert_eq!(config.group.all_login_send_mode, PermissionMode::Op);
        assert_eq!(config.group.import_flags, vec!["mail-receive".to_string()]);
        assert_eq!(config.group.import_send_mode_option, "mail-send-mode");
        assert_eq!(config.group.import_default_send_mode, PermissionMode::Member);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[storage]
path = "custom/data"

[logging]
level = "debug"
file = "custom/logs/mail.log"

[mail]
timezone = "Asia/Tokyo"
max_destinations = 3
max_attachments = 27
max_message_lines = 5
spam_protection_secs = 30
notify_unread_on_connect = false

[group]
max_create = 2
max_members = 8
default_send_mode = "EVERYONE"
default_modify_mode = "MEMBER"
default_dissolution_mode = "OP"
all_send_mode = "NEVER"
all_connected_send_mode = "EVERYONE"
all_login_send_mode = "MEMBER"
import_flags = ["mailable", "mail-receive"]
import_send_mode_option = "send"
import_default_send_mode = "OWNER"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.storage.path, "custom/data");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/mail.log");

        assert_eq!(config.mail.timezone, "Asia/Tokyo");
        assert_eq!(config.mail.max_destinations, 3);
        assert_eq!(config.mail.max_attachments, 27);
        assert_eq!(config.mail.max_message_lines, 5);
        assert_eq!(config.mail.spam_protection_secs, 30);
        assert!(!config.mail.notify_unread_on_connect);

        assert_eq!(config.group.max_create, 2);
        assert_eq!(config.group.max_members, 8);
        assert_eq!(config.group.default_send_mode, PermissionMode::Everyone);
        assert_eq!(config.group.default_modify_mode, PermissionMode::Member);
        assert_eq!(config.group.default_dissolution_mode, PermissionMode::Op);
        assert_eq!(config.group.all_send_mode, PermissionMode::Never);
        assert_eq!(config.group.all_connected_send_mode, PermissionMode::Everyone);
        assert_eq!(config.group.all_login_send_mode, PermissionMode::Member);
        assert_eq!(config.group.import_flags.len(), 2);
        assert_eq!(config.group.import_send_mode_option, "send");
        assert_eq!(config.group.import_default_send_mode, PermissionMode::Owner);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[mail]
max_destinations = 4
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.mail.max_destinations, 4);
        assert_eq!(config.mail.max_attachments, 18);
        assert_eq!(config.storage.path, "data");
        assert_eq!(config.group.max_create, 5);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.storage.path, "data");
        assert_eq!(config.mail.timezone, "UTC");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(MailbagError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_parse_invalid_mode() {
        let toml = r#"
[group]
default_send_mode = "SOMETIMES"
"#;
        assert!(matches!(Config::parse(toml), Err(MailbagError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(MailbagError::Config(_))));
    }

    #[test]
    fn test_validate_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_attachments() {
        let mut config = Config::default();
        config.mail.max_attachments = 0;

        let result = config.validate();
        if let Err(MailbagError::Config(msg)) = result {
            assert!(msg.contains("max_attachments"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_validate_zero_destinations() {
        let mut config = Config::default();
        config.mail.max_destinations = 0;
        assert!(config.validate().is_err());
    }
}
