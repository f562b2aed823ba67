//! Identities that can send, receive and administer mail.
//!
//! Every caller of the mail core is resolved into a [`MailSender`] first.
//! The implementations are plain values; none of them share mutable state.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Identity key of the server console.
pub const CONSOLE_KEY: &str = "$console";

/// Display name of the server console.
pub const CONSOLE_NAME: &str = "CONSOLE";

/// Identity key prefix of automation (block) identities.
pub const AUTOMATION_KEY_PREFIX: &str = "$block:";

/// Channel through which text reaches a connected player.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Capability interface shared by every mail identity.
pub trait MailSender: Send + Sync + fmt::Debug {
    /// Display name.
    fn name(&self) -> String;

    /// Whether text delivered now would reach someone.
    fn is_online(&self) -> bool;

    /// Deliver one line of text.
    fn deliver_message(&self, text: &str);

    /// Check a permission node.
    fn has_permission(&self, node: &str) -> bool;

    /// Whether the identity is a server operator.
    fn is_operator(&self) -> bool;

    /// Stable string form used as map and storage key.
    fn identity_key(&self) -> String;

    /// Identity equality.
    fn same_identity(&self, other: &dyn MailSender) -> bool {
        self.identity_key() == other.identity_key()
    }
}

/// Resolve the display name implied by an identity key alone.
///
/// Returns `None` for player keys, whose names only the session registry knows.
pub fn fixed_display_name(key: &str) -> Option<String> {
    if key == CONSOLE_KEY {
        return Some(CONSOLE_NAME.to_string());
    }
    key.strip_prefix(AUTOMATION_KEY_PREFIX)
        .map(|label| format!("@{label}"))
}

/// A player identified by UUID.
#[derive(Debug, Clone)]
pub struct PlayerSender {
    id: Uuid,
    name: String,
    outbox: Option<Outbox>,
    operator: bool,
    permissions: HashSet<String>,
}

impl PlayerSender {
    /// Create an offline player handle.
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            outbox: None,
            operator: false,
            permissions: HashSet::new(),
        }
    }

    /// Attach the delivery channel of the player's live session.
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Mark the player as a server operator.
    pub fn with_operator(mut self, operator: bool) -> Self {
        self.operator = operator;
        self
    }

    /// Grant a permission node.
    pub fn with_permission(mut self, node: impl Into<String>) -> Self {
        self.permissions.insert(node.into());
        self
    }

    /// Player UUID.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl MailSender for PlayerSender {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_online(&self) -> bool {
        self.outbox.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn deliver_message(&self, text: &str) {
        if let Some(tx) = &self.outbox {
            if tx.send(text.to_string()).is_err() {
                debug!("Dropped message for disconnected player {}", self.name);
            }
        }
    }

    fn has_permission(&self, node: &str) -> bool {
        self.permissions.contains(node)
    }

    fn is_operator(&self) -> bool {
        self.operator
    }

    fn identity_key(&self) -> String {
        self.id.to_string()
    }
}

/// The server console. Always online, always privileged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSender;

impl MailSender for ConsoleSender {
    fn name(&self) -> String {
        CONSOLE_NAME.to_string()
    }

    fn is_online(&self) -> bool {
        true
    }

    fn deliver_message(&self, text: &str) {
        info!(target: "console", "{}", text);
    }

    fn has_permission(&self, _node: &str) -> bool {
        true
    }

    fn is_operator(&self) -> bool {
        true
    }

    fn identity_key(&self) -> String {
        CONSOLE_KEY.to_string()
    }
}

/// A world automation source such as a command block.
///
/// Runs with operator rights but has nobody to show messages to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationSender {
    label: String,
}

impl AutomationSender {
    /// Create an automation identity, e.g. `world,10,64,-3`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl MailSender for AutomationSender {
    fn name(&self) -> String {
        format!("@{}", self.label)
    }

    fn is_online(&self) -> bool {
        false
    }

    fn deliver_message(&self, text: &str) {
        debug!("[{}] {}", self.name(), text);
    }

    fn has_permission(&self, _node: &str) -> bool {
        true
    }

    fn is_operator(&self) -> bool {
        true
    }

    fn identity_key(&self) -> String {
        format!("{AUTOMATION_KEY_PREFIX}{}", self.label)
    }
}

/// Stand-in for an identity known only by its stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderSender {
    key: String,
}

impl PlaceholderSender {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl MailSender for PlaceholderSender {
    fn name(&self) -> String {
        fixed_display_name(&self.key).unwrap_or_else(|| self.key.clone())
    }

    fn is_online(&self) -> bool {
        false
    }

    fn deliver_message(&self, _text: &str) {}

    fn has_permission(&self, _node: &str) -> bool {
        false
    }

    fn is_operator(&self) -> bool {
        false
    }

    fn identity_key(&self) -> String {
        self.key.clone()
    }
}
