//! Draft composition sessions.
//!
//! Each composing identity has at most one draft. Drafts live only in
//! memory and are dropped on send, cancel or disconnect.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::types::MailRecord;
use crate::item::Item;
use crate::{MailbagError, Result};

/// A mail being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailDraft {
    /// Identity key of the composer.
    pub from: String,
    /// Individual recipients, in the order they were added.
    pub to: Vec<String>,
    /// Group addresses, expanded when the draft is sent.
    pub to_groups: Vec<String>,
    /// Message body lines.
    pub message: Vec<String>,
    /// Money a claimer has to pay.
    pub fee_money: i64,
    /// Item a claimer has to hand over.
    pub fee_item: Option<Item>,
}

impl MailDraft {
    /// Create an empty draft.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Self::default()
        }
    }

    /// Add a recipient. Returns `false` if already present.
    pub fn add_recipient(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.to.contains(&key) {
            return false;
        }
        self.to.push(key);
        true
    }

    /// Remove a recipient. Returns `false` if not present.
    pub fn remove_recipient(&mut self, key: &str) -> bool {
        let before = self.to.len();
        self.to.retain(|to| to != key);
        self.to.len() != before
    }

    /// Add a group address. Group names compare case-insensitively.
    pub fn add_group(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.to_groups.iter().any(|g| g.eq_ignore_ascii_case(&name)) {
            return false;
        }
        self.to_groups.push(name);
        true
    }

    /// Remove a group address.
    pub fn remove_group(&mut self, name: &str) -> bool {
        let before = self.to_groups.len();
        self.to_groups.retain(|g| !g.eq_ignore_ascii_case(name));
        self.to_groups.len() != before
    }

    /// Append a message line.
    pub fn append_line(&mut self, line: impl Into<String>) {
        self.message.push(line.into());
    }

    /// Replace line `n` (0-based). Setting one past the end appends.
    pub fn set_line(&mut self, n: usize, line: impl Into<String>) -> Result<()> {
        match n.cmp(&self.message.len()) {
            std::cmp::Ordering::Less => self.message[n] = line.into(),
            std::cmp::Ordering::Equal => self.message.push(line.into()),
            std::cmp::Ordering::Greater => {
                return Err(MailbagError::Validation(format!(
                    "line {} is out of range (message has {} lines)",
                    n + 1,
                    self.message.len()
                )));
            }
        }
        Ok(())
    }

    /// Delete line `n` (0-based).
    pub fn delete_line(&mut self, n: usize) -> Result<String> {
        if n >= self.message.len() {
            return Err(MailbagError::Validation(format!(
                "line {} is out of range (message has {} lines)",
                n + 1,
                self.message.len()
            )));
        }
        Ok(self.message.remove(n))
    }

    /// Set the money fee. Negative amounts are rejected.
    pub fn set_fee_money(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(MailbagError::Validation(format!(
                "fee must not be negative, got {amount}"
            )));
        }
        self.fee_money = amount;
        Ok(())
    }

    /// Set or clear the item fee.
    pub fn set_fee_item(&mut self, item: Option<Item>) -> Result<()> {
        if let Some(item) = &item {
            item.validate()?;
        }
        self.fee_item = item;
        Ok(())
    }

    /// Build the record to send from resolved recipients and the attachments
    /// collected in the draft box.
    pub fn to_record(&self, to: Vec<String>, attachments: Vec<Item>) -> MailRecord {
        let mut record = MailRecord::draft(self.from.clone());
        record.to = to;
        record.message = self.message.clone();
        record.attachments = attachments;
        record.fee_money = self.fee_money;
        record.fee_item = self.fee_item.clone();
        record
    }
}

/// Per-identity draft sessions.
#[derive(Debug, Default)]
pub struct DraftManager {
    drafts: RwLock<HashMap<String, MailDraft>>,
}

impl DraftManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the draft of `key`, creating it if needed.
    pub async fn begin(&self, key: &str) -> MailDraft {
        let mut drafts = self.drafts.write().await;
        drafts
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Started draft for {}", key);
                MailDraft::new(key)
            })
            .clone()
    }

    /// Get the draft of `key` if one exists.
    pub async fn get(&self, key: &str) -> Option<MailDraft> {
        self.drafts.read().await.get(key).cloned()
    }

    /// Edit the draft of `key`, creating it if needed.
    ///
    /// The change is discarded if `edit` fails.
    pub async fn update<R>(
        &self,
        key: &str,
        edit: impl FnOnce(&mut MailDraft) -> Result<R>,
    ) -> Result<R> {
        let mut drafts = self.drafts.write().await;
        let draft = drafts
            .entry(key.to_string())
            .or_insert_with(|| MailDraft::new(key));
        let mut edited = draft.clone();
        let result = edit(&mut edited)?;
        *draft = edited;
        Ok(result)
    }

    /// Remove and return the draft of `key`.
    pub async fn take(&self, key: &str) -> Option<MailDraft> {
        let removed = self.drafts.write().await.remove(key);
        if removed.is_some() {
            debug!("Discarded draft of {}", key);
        }
        removed
    }

    /// Put a taken draft back, unless its owner started a new one since.
    pub async fn restore(&self, draft: MailDraft) {
        self.drafts
            .write()
            .await
            .entry(draft.from.clone())
            .or_insert(draft);
    }

    /// Number of open drafts.
    pub async fn count(&self) -> usize {
        self.drafts.read().await.len()
    }
}
