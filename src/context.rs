//! The mail context.
//!
//! [`Mailer`] owns every collection of the mail system and is built once at
//! startup. Command layers hold an `Arc<Mailer>` and resolve callers into a
//! [`MailSender`] before calling into it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachment::{AttachmentBox, AttachmentBoxes};
use crate::config::Config;
use crate::group::{
    Group, GroupAction, GroupKind, GroupProvider, GroupRegistry, GroupRepository, PermissionMode,
    PermissionPolicy,
};
use crate::item::{Item, ItemCodec, JsonItemCodec};
use crate::mail::{DraftManager, MailDraft, MailRecord, MailRepository, MailStore};
use crate::sender::{fixed_display_name, MailSender, PlayerSender};
use crate::session::SessionRegistry;
use crate::{MailbagError, Result};

/// A change to a persisted group, gated by its modify mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    AddMember(String),
    RemoveMember(String),
    SetMode(GroupAction, PermissionMode),
    SetOwner(String),
}

/// The mail system.
pub struct Mailer {
    config: Config,
    sessions: SessionRegistry,
    store: MailStore,
    boxes: AttachmentBoxes,
    drafts: DraftManager,
    groups: GroupRegistry,
    /// Last successful send per identity, for spam protection.
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Mailer {
    /// Open the mail system with the JSON item codec and no group providers.
    pub fn open(config: Config) -> Result<Self> {
        Self::with_providers(config, Arc::new(JsonItemCodec), Vec::new())
    }

    /// Open the mail system with a custom item codec and group providers.
    pub fn with_providers(
        config: Config,
        codec: Arc<dyn ItemCodec>,
        providers: Vec<Arc<dyn GroupProvider>>,
    ) -> Result<Self> {
        config.validate()?;

        let sessions = SessionRegistry::new();
        let mail_repo = MailRepository::new(config.storage.mail_dir(), codec)?;
        let store = MailStore::open(mail_repo, sessions.clone(), config.mail.timezone.clone())?;
        let group_repo = GroupRepository::new(config.storage.group_dir())?;
        let groups = GroupRegistry::open(
            group_repo,
            sessions.clone(),
            config.group.clone(),
            providers,
        )?;

        Ok(Self {
            config,
            sessions,
            store,
            boxes: AttachmentBoxes::new(),
            drafts: DraftManager::new(),
            groups,
            last_sent: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn store(&self) -> &MailStore {
        &self.store
    }

    pub fn boxes(&self) -> &AttachmentBoxes {
        &self.boxes
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Register a session for `key`.
    ///
    /// Tells the identity how many unread mails are waiting when
    /// `mail.notify_unread_on_connect` is set.
    pub async fn connect(&self, key: &str, name: &str) -> mpsc::UnboundedReceiver<String> {
        let inbox = self.sessions.connect(key, name).await;
        if self.config.mail.notify_unread_on_connect {
            let unread = self.store.unread_count(key).await;
            if unread > 0 {
                self.sessions
                    .deliver(key, &format!("You have {unread} unread mail(s)."))
                    .await;
            }
        }
        inbox
    }

    /// Register a player session and build the matching sender.
    pub async fn connect_player(
        &self,
        id: Uuid,
        name: &str,
    ) -> (PlayerSender, mpsc::UnboundedReceiver<String>) {
        let key = id.to_string();
        let inbox = self.connect(&key, name).await;
        let mut player = PlayerSender::new(id, name);
        if let Some(session) = self.sessions.get(&key).await {
            player = player.with_outbox(session.outbox());
        }
        (player, inbox)
    }

    /// End the session of `key`.
    ///
    /// The open draft and draft box are discarded. Returns the items that
    /// were in the draft box so the caller can hand them back.
    pub async fn disconnect(&self, key: &str) -> Vec<Item> {
        self.sessions.disconnect(key).await;
        self.drafts.take(key).await;
        self.last_sent.lock().await.remove(key);
        self.boxes.discard_draft_box(key).await.unwrap_or_default()
    }

    /// Start composing, or continue the open draft.
    pub async fn begin_draft(&self, sender: &dyn MailSender) -> MailDraft {
        self.drafts.begin(&sender.identity_key()).await
    }

    /// The draft attachment box of `sender`.
    pub async fn draft_box(&self, sender: &dyn MailSender) -> Arc<AttachmentBox> {
        self.boxes
            .draft_box(&sender.identity_key(), self.config.mail.max_attachments)
            .await
    }

    /// Drop the draft of `sender`. Returns the draft box items.
    pub async fn cancel_draft(&self, sender: &dyn MailSender) -> Vec<Item> {
        let key = sender.identity_key();
        self.drafts.take(&key).await;
        self.boxes.discard_draft_box(&key).await.unwrap_or_default()
    }

    /// Send the draft of `sender`.
    ///
    /// Group addresses are expanded and checked against their send mode,
    /// the configured limits are enforced and the draft box becomes the
    /// mail's attachments. On failure the draft and its box stay as they were.
    ///
    /// The draft is taken out of the manager for the duration of the send,
    /// so concurrent sends by one identity deliver it at most once.
    pub async fn send_draft(&self, sender: &dyn MailSender) -> Result<MailRecord> {
        let key = sender.identity_key();
        let draft = self
            .drafts
            .take(&key)
            .await
            .ok_or_else(|| MailbagError::NotFound(format!("draft of {}", sender.name())))?;

        let to = match self.prepare(sender, &draft).await {
            Ok(to) => to,
            Err(e) => {
                self.drafts.restore(draft).await;
                return Err(e);
            }
        };
        let previous = match self.reserve_send_slot(sender).await {
            Ok(previous) => previous,
            Err(e) => {
                self.drafts.restore(draft).await;
                return Err(e);
            }
        };

        let attachments = self
            .boxes
            .discard_draft_box(&key)
            .await
            .unwrap_or_default();
        let record = draft.to_record(to, attachments.clone());

        match self.store.send(record, sender).await {
            Ok(mail) => Ok(mail),
            Err(e) => {
                self.release_send_slot(&key, previous).await;
                self.drafts.restore(draft).await;
                self.restore_draft_box(&key, attachments).await;
                Err(e)
            }
        }
    }

    /// Check the limits and resolve the recipients of a draft.
    async fn prepare(&self, sender: &dyn MailSender, draft: &MailDraft) -> Result<Vec<String>> {
        self.check_limits(draft)?;
        let to = self.resolve_recipients(sender, draft).await?;
        if to.is_empty() {
            return Err(MailbagError::NoRecipients);
        }
        Ok(to)
    }

    async fn restore_draft_box(&self, key: &str, items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        let draft_box = self
            .boxes
            .draft_box(key, self.config.mail.max_attachments)
            .await;
        for item in items {
            if let Err(e) = draft_box.put(item).await {
                warn!("Could not restore draft attachment of {}: {}", key, e);
            }
        }
    }

    fn check_limits(&self, draft: &MailDraft) -> Result<()> {
        let mail = &self.config.mail;

        let addresses = draft.to.len() + draft.to_groups.len();
        if addresses > mail.max_destinations {
            return Err(MailbagError::Validation(format!(
                "too many destinations: {addresses} (max {})",
                mail.max_destinations
            )));
        }
        if draft.message.len() > mail.max_message_lines {
            return Err(MailbagError::Validation(format!(
                "message has {} lines (max {})",
                draft.message.len(),
                mail.max_message_lines
            )));
        }
        Ok(())
    }

    /// Record a send by `sender` now, enforcing the spam interval.
    ///
    /// Check and record happen under one lock. Returns the previous send
    /// time so a failed send can give the slot back.
    async fn reserve_send_slot(&self, sender: &dyn MailSender) -> Result<Option<DateTime<Utc>>> {
        let key = sender.identity_key();
        let secs = self.config.mail.spam_protection_secs;
        let now = Utc::now();

        let mut last_sent = self.last_sent.lock().await;
        if secs > 0 && !sender.is_operator() {
            if let Some(last) = last_sent.get(&key) {
                let wait = Duration::seconds(secs as i64);
                let elapsed = now - *last;
                if elapsed < wait {
                    return Err(MailbagError::Validation(format!(
                        "please wait {} more second(s) before sending again",
                        (wait - elapsed).num_seconds().max(1)
                    )));
                }
            }
        }
        Ok(last_sent.insert(key, now))
    }

    async fn release_send_slot(&self, key: &str, previous: Option<DateTime<Utc>>) {
        let mut last_sent = self.last_sent.lock().await;
        match previous {
            Some(at) => last_sent.insert(key.to_string(), at),
            None => last_sent.remove(key),
        };
    }

    /// Expand a draft's addresses into identity keys.
    ///
    /// Every group must exist and allow `sender` to send to it. The result
    /// keeps first occurrences and drops duplicates.
    pub async fn resolve_recipients(
        &self,
        sender: &dyn MailSender,
        draft: &MailDraft,
    ) -> Result<Vec<String>> {
        let mut to = draft.to.clone();

        for name in &draft.to_groups {
            let group = self.groups.get(name).await?;
            if !PermissionPolicy::can(sender, GroupAction::Send, &group) {
                return Err(MailbagError::Permission(format!(
                    "{} may not send to group {}",
                    sender.name(),
                    group.name
                )));
            }
            let members = match group.kind {
                GroupKind::AllIdentities => self.all_identities().await,
                _ => group.members(),
            };
            debug!("Group {} expands to {} member(s)", group.name, members.len());
            to.extend(members);
        }

        let mut seen = HashSet::new();
        to.retain(|key| seen.insert(key.clone()));
        Ok(to)
    }

    /// Every player identity this server knows of.
    async fn all_identities(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self
            .sessions
            .ever_connected_keys()
            .await
            .into_iter()
            .collect();
        keys.extend(self.store.known_identities().await);
        keys.extend(self.groups.persisted_members().await);
        keys.into_iter()
            .filter(|key| fixed_display_name(key).is_none())
            .collect()
    }

    /// Show a mail to `viewer`, marking it read for recipients.
    pub async fn display(&self, viewer: &dyn MailSender, index: u32) -> Result<MailRecord> {
        self.store.display(viewer, index).await
    }

    /// Open the claim box of a mail.
    ///
    /// Recipients and operators may open it. The first opener moves the
    /// attachments out of the mail; everyone gets the same box.
    pub async fn open_attachments(
        &self,
        viewer: &dyn MailSender,
        index: u32,
    ) -> Result<Arc<AttachmentBox>> {
        let mail = self.store.get(index).await?;
        if !mail.is_recipient(&viewer.identity_key()) && !viewer.is_operator() {
            return Err(MailbagError::Permission(format!(
                "{} is not a recipient of mail #{}",
                viewer.name(),
                index
            )));
        }
        self.boxes.open(&self.store, index).await
    }

    /// Create a group owned by `requester`, within their creation quota.
    pub async fn create_group(&self, requester: &dyn MailSender, name: &str) -> Result<Group> {
        self.groups.create_within_quota(requester, name).await
    }

    /// Dissolve a group if `requester` passes its dissolution mode.
    pub async fn dissolve_group(&self, requester: &dyn MailSender, name: &str) -> Result<Group> {
        self.authorize(requester, name, GroupAction::Dissolve).await?;
        self.groups.remove(name).await
    }

    /// Apply a change to a group if `requester` passes its modify mode.
    ///
    /// Returns `false` when the change had no effect.
    pub async fn modify_group(
        &self,
        requester: &dyn MailSender,
        name: &str,
        change: GroupChange,
    ) -> Result<bool> {
        self.authorize(requester, name, GroupAction::Modify).await?;
        match change {
            GroupChange::AddMember(key) => self.groups.add_member(name, &key).await,
            GroupChange::RemoveMember(key) => self.groups.remove_member(name, &key).await,
            GroupChange::SetMode(action, mode) => {
                self.groups.set_mode(name, action, mode).await.map(|_| true)
            }
            GroupChange::SetOwner(owner) => {
                self.groups.set_owner(name, &owner).await.map(|_| true)
            }
        }
    }

    async fn authorize(
        &self,
        requester: &dyn MailSender,
        name: &str,
        action: GroupAction,
    ) -> Result<Group> {
        let group = self.groups.get(name).await?;
        if !PermissionPolicy::can(requester, action, &group) {
            return Err(MailbagError::Permission(format!(
                "{} may not {} group {}",
                requester.name(),
                action.as_str(),
                group.name
            )));
        }
        Ok(group)
    }

    /// Re-read all mails and groups from storage.
    pub async fn reload(&self) -> Result<()> {
        let mails = self.store.reload().await?;
        let groups = self.groups.reload().await?;
        info!("Reload finished: {} mail(s), {} group(s)", mails, groups);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::ConsoleSender;
    use tempfile::TempDir;

    fn open_mailer(temp_dir: &TempDir) -> Mailer {
        let mut config = Config::default();
        config.storage.path = temp_dir.path().to_string_lossy().into_owned();
        Mailer::open(config).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let _mailer = open_mailer(&temp_dir);
        assert!(temp_dir.path().join("mail").is_dir());
        assert!(temp_dir.path().join("group").is_dir());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = temp_dir.path().to_string_lossy().into_owned();
        config.mail.max_attachments = 0;
        assert!(matches!(Mailer::open(config), Err(MailbagError::Config(_))));
    }

    #[tokio::test]
    async fn test_send_without_draft() {
        let temp_dir = TempDir::new().unwrap();
        let mailer = open_mailer(&temp_dir);
        assert!(matches!(
            mailer.send_draft(&ConsoleSender).await,
            Err(MailbagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_empty_draft_keeps_attachments() {
        let temp_dir = TempDir::new().unwrap();
        let mailer = open_mailer(&temp_dir);
        mailer.begin_draft(&ConsoleSender).await;
        mailer
            .draft_box(&ConsoleSender)
            .await
            .put(Item::new("STONE", 1))
            .await
            .unwrap();

        assert!(matches!(
            mailer.send_draft(&ConsoleSender).await,
            Err(MailbagError::NoRecipients)
        ));
        assert_eq!(mailer.draft_box(&ConsoleSender).await.len().await, 1);
        assert!(mailer.drafts().get(crate::sender::CONSOLE_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_connect_reports_unread() {
        let temp_dir = TempDir::new().unwrap();
        let mailer = open_mailer(&temp_dir);
        let mut draft = MailRecord::draft("");
        draft.to = vec!["bob".to_string()];
        mailer.store().send(draft, &ConsoleSender).await.unwrap();

        let mut inbox = mailer.connect("bob", "Bob").await;
        assert_eq!(inbox.recv().await.unwrap(), "You have 1 unread mail(s).");
    }

    #[tokio::test]
    async fn test_disconnect_discards_draft() {
        let temp_dir = TempDir::new().unwrap();
        let mailer = open_mailer(&temp_dir);
        let (alice, _inbox) = mailer.connect_player(Uuid::new_v4(), "alice").await;
        assert!(alice.is_online());

        mailer.begin_draft(&alice).await;
        mailer
            .draft_box(&alice)
            .await
            .put(Item::new("DIAMOND", 1))
            .await
            .unwrap();

        let returned = mailer.disconnect(&alice.identity_key()).await;
        assert_eq!(returned, vec![Item::new("DIAMOND", 1)]);
        assert_eq!(mailer.drafts().count().await, 0);
        assert_eq!(mailer.boxes().draft_count().await, 0);
    }
}
