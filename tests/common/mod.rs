//! Test helpers for integration tests.
//!
//! Provides a mailer backed by a temporary directory and helpers for
//! connecting players and sending mail.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use mailbag::{Config, Item, MailRecord, MailSender, Mailer, PlayerSender};

/// A mailer together with the directory holding its storage.
pub struct TestMailer {
    pub mailer: Arc<Mailer>,
    pub dir: TempDir,
}

impl TestMailer {
    /// Open a fresh mailer with default settings.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Open a fresh mailer, adjusting the default settings first.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        adjust(&mut config);
        let mailer = Arc::new(Mailer::open(config).unwrap());
        Self { mailer, dir }
    }

    /// Open a second mailer over the same storage, as after a restart.
    pub fn reopen(&self) -> Mailer {
        Mailer::open(test_config(&self.dir)).unwrap()
    }

    /// Connect a new player with a random UUID.
    pub async fn player(&self, name: &str) -> (PlayerSender, mpsc::UnboundedReceiver<String>) {
        self.mailer.connect_player(Uuid::new_v4(), name).await
    }
}

/// Default configuration pointing at `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.path = dir.path().to_string_lossy().into_owned();
    config
}

/// Build an unsent record addressed to `to`.
pub fn record_to(to: &[&str], items: Vec<Item>) -> MailRecord {
    let mut record = MailRecord::draft("");
    record.to = to.iter().map(|s| s.to_string()).collect();
    record.message = vec!["test message".to_string()];
    record.attachments = items;
    record
}

/// Send a mail directly through the store.
pub async fn send_to(
    mailer: &Mailer,
    sender: &dyn MailSender,
    to: &[&str],
    items: Vec<Item>,
) -> MailRecord {
    mailer
        .store()
        .send(record_to(to, items), sender)
        .await
        .unwrap()
}

/// Drain every message waiting in a session channel.
pub fn drain(inbox: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = inbox.try_recv() {
        lines.push(line);
    }
    lines
}
