//! Attachment boxes.
//!
//! Two independent maps are kept:
//! - draft boxes, one per composing identity, holding what will be attached
//! - claim boxes, one per delivered mail index, holding what was claimed
//!
//! A claim box is created the first time anyone opens a mail's attachments.
//! Creating it moves the items out of the mail, so the same items can never
//! be materialized twice.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::item::Item;
use crate::mail::MailStore;
use crate::{MailbagError, Result};

/// Slots per row of a claim box.
pub const ROW_SLOTS: usize = 9;

/// Capacity of a claim box holding `count` items: whole rows, at least one.
pub fn claim_capacity(count: usize) -> usize {
    count.div_ceil(ROW_SLOTS).max(1) * ROW_SLOTS
}

/// A fixed-capacity item container shared by everyone viewing it.
#[derive(Debug)]
pub struct AttachmentBox {
    capacity: usize,
    items: Mutex<Vec<Item>>,
}

impl AttachmentBox {
    /// Create an empty box.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(Vec::new()),
        }
    }

    fn filled(capacity: usize, items: Vec<Item>) -> Self {
        Self {
            capacity,
            items: Mutex::new(items),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the contents.
    pub async fn items(&self) -> Vec<Item> {
        self.items.lock().await.clone()
    }

    /// Number of occupied slots.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Check if the box is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Put an item into the box.
    pub async fn put(&self, item: Item) -> Result<()> {
        item.validate()?;
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            return Err(MailbagError::Validation(format!(
                "attachment box is full ({} slots)",
                self.capacity
            )));
        }
        items.push(item);
        Ok(())
    }

    /// Take the item in `slot` out of the box.
    pub async fn take(&self, slot: usize) -> Option<Item> {
        let mut items = self.items.lock().await;
        if slot < items.len() {
            Some(items.remove(slot))
        } else {
            None
        }
    }

    /// Take everything out of the box.
    pub async fn take_all(&self) -> Vec<Item> {
        std::mem::take(&mut *self.items.lock().await)
    }
}

/// Registry of draft and claim boxes.
#[derive(Debug, Default)]
pub struct AttachmentBoxes {
    drafts: Mutex<HashMap<String, Arc<AttachmentBox>>>,
    claims: Mutex<HashMap<u32, Arc<AttachmentBox>>>,
}

impl AttachmentBoxes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the draft box of `key`, creating it with `capacity` slots if needed.
    pub async fn draft_box(&self, key: &str, capacity: usize) -> Arc<AttachmentBox> {
        let mut drafts = self.drafts.lock().await;
        Arc::clone(drafts.entry(key.to_string()).or_insert_with(|| {
            debug!("Created draft box for {}", key);
            Arc::new(AttachmentBox::new(capacity))
        }))
    }

    /// Drop the draft box of `key` and hand back what was in it.
    pub async fn discard_draft_box(&self, key: &str) -> Option<Vec<Item>> {
        let removed = self.drafts.lock().await.remove(key)?;
        Some(removed.take_all().await)
    }

    /// Open the claim box of a delivered mail.
    ///
    /// The first call for an index moves the mail's attachments into a new
    /// box; every later call returns that same box, including whatever has
    /// been taken out of it since.
    pub async fn open(&self, store: &MailStore, index: u32) -> Result<Arc<AttachmentBox>> {
        let mut claims = self.claims.lock().await;
        if let Some(existing) = claims.get(&index) {
            return Ok(Arc::clone(existing));
        }

        let items = store.take_attachments(index).await?;
        let claim = Arc::new(AttachmentBox::filled(claim_capacity(items.len()), items));
        claims.insert(index, Arc::clone(&claim));
        info!(
            "Opened claim box for mail #{} ({} slots)",
            index,
            claim.capacity()
        );
        Ok(claim)
    }

    /// Get an already opened claim box.
    pub async fn claim_box(&self, index: u32) -> Option<Arc<AttachmentBox>> {
        self.claims.lock().await.get(&index).cloned()
    }

    /// Number of open draft boxes.
    pub async fn draft_count(&self) -> usize {
        self.drafts.lock().await.len()
    }

    /// Number of opened claim boxes.
    pub async fn claim_count(&self) -> usize {
        self.claims.lock().await.len()
    }
}
