//! Mail module for mailbag.
//!
//! This module provides the mail engine including:
//! - Mail records and their file persistence
//! - Index allocation, inbox/outbox/unread queries and read tracking
//! - Draft composition sessions
//! - Text rendering of mails

mod draft;
mod format;
mod repository;
mod store;
mod types;

pub use draft::{DraftManager, MailDraft};
pub use format::{format_mail, format_summary};
pub use repository::MailRepository;
pub use store::MailStore;
pub use types::{MailRecord, DRAFT_INDEX};
