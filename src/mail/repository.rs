//! Mail repository for mailbag.
//!
//! One JSON file per delivered mail, named after the zero-padded index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::MailRecord;
use crate::datetime::{from_epoch_millis, to_epoch_millis};
use crate::item::{decode_items, encode_items, ItemCodec};
use crate::storage;
use crate::{MailbagError, Result};

/// Indices stop below this value so the next index always fits in a `u32`.
pub(crate) const MAX_MAIL_INDEX: u32 = u32::MAX;

/// On-disk shape of a mail record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMail {
    to: Vec<String>,
    from: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(default)]
    attachments: Vec<Value>,
    #[serde(default)]
    fee_money: i64,
    #[serde(default)]
    fee_item: Option<Value>,
    index: u32,
    #[serde(default)]
    read_flags: BTreeMap<String, bool>,
    #[serde(default)]
    attachments_original: Vec<Value>,
    #[serde(default)]
    date: Option<i64>,
}

/// Repository for persisted mails.
pub struct MailRepository {
    dir: PathBuf,
    codec: Arc<dyn ItemCodec>,
}

impl MailRepository {
    /// Open the repository rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, codec: Arc<dyn ItemCodec>) -> Result<Self> {
        let dir = dir.into();
        storage::ensure_dir(&dir)?;
        Ok(Self { dir, codec })
    }

    /// Directory holding the mail files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage key of a mail, e.g. `00000001`.
    pub fn key(index: u32) -> String {
        format!("{index:08}")
    }

    /// Save (create or overwrite) a delivered mail.
    ///
    /// Drafts are refused.
    pub fn save(&self, mail: &MailRecord) -> Result<()> {
        if mail.is_draft() {
            return Err(MailbagError::Validation(
                "a draft cannot be persisted as a delivered mail".to_string(),
            ));
        }

        let stored = StoredMail {
            to: mail.to.clone(),
            from: mail.from.clone(),
            message: mail.message.clone(),
            attachments: encode_items(self.codec.as_ref(), &mail.attachments)?,
            fee_money: mail.fee_money,
            fee_item: mail
                .fee_item
                .as_ref()
                .map(|item| self.codec.encode(item))
                .transpose()?,
            index: mail.index,
            read_flags: mail.read_flags.clone(),
            attachments_original: encode_items(self.codec.as_ref(), &mail.attachments_original)?,
            date: mail.date.as_ref().map(to_epoch_millis),
        };

        let content = serde_json::to_vec_pretty(&stored)?;
        let path = storage::record_path(&self.dir, &Self::key(mail.index));
        storage::write_atomic(&path, &content)?;
        debug!("Saved mail #{} to {:?}", mail.index, path);
        Ok(())
    }

    /// Load a single mail.
    pub fn load(&self, index: u32) -> Result<MailRecord> {
        let path = storage::record_path(&self.dir, &Self::key(index));
        let content = storage::read_record(&path)?
            .ok_or_else(|| MailbagError::NotFound(format!("mail #{index}")))?;
        self.decode(&content, &path)
    }

    /// Load every persisted mail, ordered by index.
    ///
    /// Malformed files are logged and skipped. Only a failure to list the
    /// directory is an error.
    pub fn load_all(&self) -> Result<Vec<MailRecord>> {
        let mut mails = Vec::new();
        for path in storage::list_records(&self.dir)? {
            let loaded = storage::read_record(&path).and_then(|content| match content {
                Some(content) => self.decode(&content, &path).map(Some),
                None => Ok(None),
            });
            match loaded {
                Ok(Some(mail)) => mails.push(mail),
                Ok(None) => {}
                Err(e) => warn!("Skipping mail file {:?}: {}", path, e),
            }
        }
        mails.sort_by_key(|mail| mail.index);
        Ok(mails)
    }

    fn decode(&self, content: &[u8], path: &Path) -> Result<MailRecord> {
        let stored: StoredMail = serde_json::from_slice(content)?;
        if stored.index == 0 || stored.index == MAX_MAIL_INDEX {
            return Err(MailbagError::MalformedRecord(format!(
                "stored mail has index {}",
                stored.index
            )));
        }
        let stem = path.file_stem().and_then(|stem| stem.to_str());
        if stem.and_then(|stem| stem.parse::<u32>().ok()) != Some(stored.index) {
            return Err(MailbagError::MalformedRecord(format!(
                "file {:?} holds mail #{}",
                path, stored.index
            )));
        }

        let context = format!("mail #{}", stored.index);
        let date = match stored.date {
            Some(millis) => Some(from_epoch_millis(millis).ok_or_else(|| {
                MailbagError::MalformedRecord(format!("{context}: invalid date {millis}"))
            })?),
            None => None,
        };
        let fee_item = stored.fee_item.as_ref().and_then(|value| {
            self.codec
                .decode(value)
                .map_err(|e| warn!("Dropping fee item of {} ({:?}): {}", context, path, e))
                .ok()
        });

        Ok(MailRecord {
            index: stored.index,
            from: stored.from,
            to: stored.to,
            message: stored.message,
            attachments: decode_items(self.codec.as_ref(), &stored.attachments, &context),
            attachments_original: decode_items(
                self.codec.as_ref(),
                &stored.attachments_original,
                &context,
            ),
            fee_money: stored.fee_money,
            fee_item,
            read_flags: stored.read_flags,
            date,
        })
    }
}
