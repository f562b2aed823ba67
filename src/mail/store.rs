//! Mail store for mailbag.
//!
//! The store owns every delivered mail in memory, allocates indices and
//! writes each change through to the [`MailRepository`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{SubsecRound, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::format::format_mail;
use super::repository::{MailRepository, MAX_MAIL_INDEX};
use super::types::MailRecord;
use crate::item::Item;
use crate::sender::MailSender;
use crate::session::SessionRegistry;
use crate::{MailbagError, Result};

#[derive(Debug)]
struct MailState {
    mails: BTreeMap<u32, MailRecord>,
    next_index: u32,
}

impl MailState {
    fn from_records(records: Vec<MailRecord>) -> Self {
        let next_index = records
            .iter()
            .map(|m| m.index)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        let mails = records.into_iter().map(|m| (m.index, m)).collect();
        Self { mails, next_index }
    }

    /// Records matching `filter`, newest first. Equal dates keep index order.
    fn query(&self, filter: impl Fn(&MailRecord) -> bool) -> Vec<MailRecord> {
        let mut result: Vec<MailRecord> = self
            .mails
            .values()
            .filter(|m| filter(m))
            .cloned()
            .collect();
        result.sort_by_key(|m| (Reverse(m.date), m.index));
        result
    }
}

/// In-memory mail collection backed by a [`MailRepository`].
pub struct MailStore {
    repo: MailRepository,
    sessions: SessionRegistry,
    timezone: String,
    state: RwLock<MailState>,
}

impl MailStore {
    /// Open a store and load every persisted mail.
    pub fn open(
        repo: MailRepository,
        sessions: SessionRegistry,
        timezone: impl Into<String>,
    ) -> Result<Self> {
        let state = MailState::from_records(repo.load_all()?);
        info!(
            "Loaded {} mail(s) from {:?}, next index {}",
            state.mails.len(),
            repo.dir(),
            state.next_index
        );
        Ok(Self {
            repo,
            sessions,
            timezone: timezone.into(),
            state: RwLock::new(state),
        })
    }

    /// Send a mail.
    ///
    /// The record's recipients are deduplicated, an index is allocated, the
    /// date is stamped and the attachments are snapshotted. Reachable
    /// recipients and the sender get a notification.
    ///
    /// Attachments and the fee item must have a valid shape, so that the
    /// stored record loads back unchanged. A failure to persist is logged;
    /// the mail still exists in memory.
    pub async fn send(
        &self,
        mut record: MailRecord,
        sender: &dyn MailSender,
    ) -> Result<MailRecord> {
        record.dedup_recipients();
        if record.to.is_empty() {
            return Err(MailbagError::NoRecipients);
        }
        for item in record.attachments.iter().chain(record.fee_item.as_ref()) {
            item.validate()?;
        }

        let sent = {
            let mut state = self.state.write().await;
            if state.next_index == MAX_MAIL_INDEX {
                return Err(MailbagError::Validation(
                    "no mail index left to allocate".to_string(),
                ));
            }
            record.index = state.next_index;
            state.next_index += 1;
            record.from = sender.identity_key();
            record.date = Some(Utc::now().trunc_subsecs(3));
            record.attachments_original = record.attachments.clone();
            record.read_flags.clear();

            if let Err(e) = self.repo.save(&record) {
                error!("Failed to save mail #{}: {}", record.index, e);
            }
            state.mails.insert(record.index, record.clone());
            record
        };

        info!(
            "Mail #{} sent by {} to {} recipient(s)",
            sent.index,
            sent.from,
            sent.to.len()
        );

        let notice = format!("You have new mail #{} from {}.", sent.index, sender.name());
        for key in &sent.to {
            if self.sessions.deliver(key, &notice).await {
                debug!("Notified {} of mail #{}", key, sent.index);
            }
        }
        sender.deliver_message(&format!(
            "Mail #{} sent to {} recipient(s).",
            sent.index,
            sent.to.len()
        ));

        Ok(sent)
    }

    /// Get a mail by index.
    pub async fn get(&self, index: u32) -> Result<MailRecord> {
        self.state
            .read()
            .await
            .mails
            .get(&index)
            .cloned()
            .ok_or_else(|| MailbagError::NotFound(format!("mail #{index}")))
    }

    /// Mails addressed to `key`, newest first.
    pub async fn inbox(&self, key: &str) -> Vec<MailRecord> {
        self.state.read().await.query(|m| m.is_recipient(key))
    }

    /// Mails sent by `key`, newest first.
    pub async fn outbox(&self, key: &str) -> Vec<MailRecord> {
        self.state.read().await.query(|m| m.is_sender(key))
    }

    /// Unread mails addressed to `key`, newest first.
    pub async fn unread(&self, key: &str) -> Vec<MailRecord> {
        self.state
            .read()
            .await
            .query(|m| m.is_recipient(key) && !m.is_read(key))
    }

    /// Number of unread mails addressed to `key`.
    pub async fn unread_count(&self, key: &str) -> usize {
        self.state
            .read()
            .await
            .mails
            .values()
            .filter(|m| m.is_recipient(key) && !m.is_read(key))
            .count()
    }

    /// Total number of mails.
    pub async fn count(&self) -> usize {
        self.state.read().await.mails.len()
    }

    /// Index the next sent mail will receive.
    pub async fn next_index(&self) -> u32 {
        self.state.read().await.next_index
    }

    /// Every identity that appears as sender or recipient of a stored mail.
    pub async fn known_identities(&self) -> BTreeSet<String> {
        let state = self.state.read().await;
        let mut keys = BTreeSet::new();
        for mail in state.mails.values() {
            keys.insert(mail.from.clone());
            keys.extend(mail.to.iter().cloned());
        }
        keys
    }

    /// Show a mail to `viewer`.
    ///
    /// If the viewer is a recipient, their read flag is set and persisted.
    /// Returns the record as it is after the call.
    pub async fn display(&self, viewer: &dyn MailSender, index: u32) -> Result<MailRecord> {
        let mail = self.get(index).await?;

        let from_name = self.sessions.display_name(&mail.from).await;
        let to_names = self.sessions.display_names(&mail.to).await;
        for line in format_mail(&mail, &from_name, &to_names, &self.timezone) {
            viewer.deliver_message(&line);
        }

        let key = viewer.identity_key();
        if mail.is_recipient(&key) && !mail.is_read(&key) {
            self.mark_read(index, &key).await?;
            return self.get(index).await;
        }
        Ok(mail)
    }

    /// Set the read flag of recipient `key` on a mail.
    ///
    /// Returns `true` if the flag changed. A failure to persist is logged.
    pub async fn mark_read(&self, index: u32, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let mail = state
            .mails
            .get_mut(&index)
            .ok_or_else(|| MailbagError::NotFound(format!("mail #{index}")))?;

        if !mail.mark_read(key) {
            return Ok(false);
        }
        debug!("Mail #{} read by {}", index, key);
        if let Err(e) = self.repo.save(mail) {
            error!("Failed to save read flag of mail #{}: {}", index, e);
        }
        Ok(true)
    }

    /// Move the unclaimed attachments out of a mail.
    ///
    /// After this call the mail's `attachments` is empty for good. Only the
    /// claim path of [`crate::attachment::AttachmentBoxes`] calls this.
    pub(crate) async fn take_attachments(&self, index: u32) -> Result<Vec<Item>> {
        let mut state = self.state.write().await;
        let mail = state
            .mails
            .get_mut(&index)
            .ok_or_else(|| MailbagError::NotFound(format!("mail #{index}")))?;

        let items = std::mem::take(&mut mail.attachments);
        if !items.is_empty() {
            if let Err(e) = self.repo.save(mail) {
                error!("Failed to save claimed mail #{}: {}", index, e);
            }
            debug!("Claimed {} attachment(s) of mail #{}", items.len(), index);
        }
        Ok(items)
    }

    /// Re-read every persisted mail.
    ///
    /// The in-memory state is replaced only once loading succeeded.
    /// Returns the number of mails loaded.
    pub async fn reload(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let loaded = MailState::from_records(self.repo.load_all()?);
        let count = loaded.mails.len();
        *state = loaded;
        info!("Reloaded {} mail(s), next index {}", count, state.next_index);
        Ok(count)
    }
}
