//! mailbag - player mail for multiplayer game servers
//!
//! Asynchronous private messages with item attachments, per-recipient read
//! tracking and addressing to identities or named groups.

pub mod attachment;
pub mod config;
pub mod context;
pub mod datetime;
pub mod error;
pub mod group;
pub mod item;
pub mod logging;
pub mod mail;
pub mod sender;
pub mod session;
mod storage;

pub use attachment::{AttachmentBox, AttachmentBoxes};
pub use config::Config;
pub use context::{GroupChange, Mailer};
pub use error::{MailbagError, Result};
pub use group::{
    Group, GroupAction, GroupKind, GroupProvider, GroupRegistry, PermissionMode, PermissionPolicy,
};
pub use item::{Item, ItemCodec, JsonItemCodec};
pub use mail::{DraftManager, MailDraft, MailRecord, MailStore};
pub use sender::{AutomationSender, ConsoleSender, MailSender, PlaceholderSender, PlayerSender};
pub use session::SessionRegistry;
