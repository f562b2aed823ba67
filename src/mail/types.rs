//! Mail types for mailbag.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::item::Item;

/// Index carried by a mail that has not been sent yet.
pub const DRAFT_INDEX: u32 = 0;

/// A mail message, either a draft (`index == 0`) or a delivered mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecord {
    /// Unique, monotonically assigned index. [`DRAFT_INDEX`] until sent.
    pub index: u32,
    /// Identity key of the sender.
    pub from: String,
    /// Identity keys of the recipients, without duplicates.
    pub to: Vec<String>,
    /// Message body lines.
    pub message: Vec<String>,
    /// Attachments not claimed yet. Empty once the claim box was opened.
    pub attachments: Vec<Item>,
    /// Attachments as they were when the mail was sent.
    pub attachments_original: Vec<Item>,
    /// Money a claimer has to pay before the attachments are released.
    pub fee_money: i64,
    /// Item a claimer has to hand over before the attachments are released.
    pub fee_item: Option<Item>,
    /// Read state per recipient. A missing entry means unread.
    pub read_flags: BTreeMap<String, bool>,
    /// Send timestamp. `None` for drafts.
    pub date: Option<DateTime<Utc>>,
}

impl MailRecord {
    /// Create an empty draft composed by `from`.
    pub fn draft(from: impl Into<String>) -> Self {
        Self {
            index: DRAFT_INDEX,
            from: from.into(),
            to: Vec::new(),
            message: Vec::new(),
            attachments: Vec::new(),
            attachments_original: Vec::new(),
            fee_money: 0,
            fee_item: None,
            read_flags: BTreeMap::new(),
            date: None,
        }
    }

    /// Check if this record is an unsent draft.
    pub fn is_draft(&self) -> bool {
        self.index == DRAFT_INDEX
    }

    /// Check if `key` is one of the recipients.
    pub fn is_recipient(&self, key: &str) -> bool {
        self.to.iter().any(|to| to == key)
    }

    /// Check if `key` sent this mail.
    pub fn is_sender(&self, key: &str) -> bool {
        self.from == key
    }

    /// Check if the recipient `key` has read this mail.
    pub fn is_read(&self, key: &str) -> bool {
        self.read_flags.get(key).copied().unwrap_or(false)
    }

    /// Set the read flag of a recipient.
    ///
    /// Returns `true` if the flag changed.
    pub fn mark_read(&mut self, key: &str) -> bool {
        if !self.is_recipient(key) || self.is_read(key) {
            return false;
        }
        self.read_flags.insert(key.to_string(), true);
        true
    }

    /// Whether the attachments have been moved into a claim box.
    pub fn is_claimed(&self) -> bool {
        self.attachments.is_empty() && !self.attachments_original.is_empty()
    }

    /// Whether claiming the attachments costs something.
    pub fn has_fee(&self) -> bool {
        self.fee_money > 0 || self.fee_item.is_some()
    }

    /// Remove duplicate recipients, keeping the first occurrence of each.
    pub fn dedup_recipients(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.to.retain(|key| seen.insert(key.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MailRecord {
        let mut mail = MailRecord::draft("alice");
        mail.to = vec!["bob".to_string(), "carol".to_string()];
        mail
    }

    #[test]
    fn test_new_draft() {
        let draft = MailRecord::draft("alice");
        assert!(draft.is_draft());
        assert_eq!(draft.from, "alice");
        assert!(draft.to.is_empty());
        assert!(draft.date.is_none());
        assert!(!draft.has_fee());
    }

    #[test]
    fn test_dedup_preserves_first_occurrence() {
        let mut mail = MailRecord::draft("alice");
        mail.to = ["a", "b", "a", "c", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        mail.dedup_recipients();
        assert_eq!(mail.to, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_read_flags_are_per_recipient() {
        let mut mail = sample();
        assert!(!mail.is_read("bob"));
        assert!(!mail.is_read("carol"));

        assert!(mail.mark_read("bob"));
        assert!(mail.is_read("bob"));
        assert!(!mail.is_read("carol"));
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut mail = sample();
        assert!(mail.mark_read("bob"));
        assert!(!mail.mark_read("bob"));
        assert_eq!(mail.read_flags.len(), 1);
    }

    #[test]
    fn test_mark_read_ignores_non_recipients() {
        let mut mail = sample();
        assert!(!mail.mark_read("alice"));
        assert!(!mail.mark_read("mallory"));
        assert!(mail.read_flags.is_empty());
    }

    #[test]
    fn test_sender_and_recipient() {
        let mail = sample();
        assert!(mail.is_sender("alice"));
        assert!(!mail.is_sender("bob"));
        assert!(mail.is_recipient("carol"));
        assert!(!mail.is_recipient("alice"));
    }

    #[test]
    fn test_is_claimed() {
        let mut mail = sample();
        assert!(!mail.is_claimed());

        mail.attachments = vec![Item::new("DIAMOND", 1)];
        mail.attachments_original = mail.attachments.clone();
        assert!(!mail.is_claimed());

        mail.attachments.clear();
        assert!(mail.is_claimed());
    }

    #[test]
    fn test_has_fee() {
        let mut mail = sample();
        mail.fee_money = 10;
        assert!(mail.has_fee());

        mail.fee_money = 0;
        mail.fee_item = Some(Item::new("GOLD_INGOT", 2));
        assert!(mail.has_fee());
    }
}
