//! Attachment item descriptors and their persisted encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{MailbagError, Result};

/// Largest stack a single attachment slot may hold.
pub const MAX_STACK_AMOUNT: u32 = 64;

/// An item-like attachment carried by a mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item kind, e.g. `DIAMOND`.
    pub material: String,
    /// Stack size.
    pub amount: u32,
    /// Custom display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Descriptive lines shown under the name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lore: Vec<String>,
}

impl Item {
    /// Create a plain item stack.
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self {
            material: material.into(),
            amount,
            name: None,
            lore: Vec::new(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a lore line.
    pub fn with_lore(mut self, line: impl Into<String>) -> Self {
        self.lore.push(line.into());
        self
    }

    /// Check the basic shape of the descriptor.
    pub fn validate(&self) -> Result<()> {
        if self.material.trim().is_empty() {
            return Err(MailbagError::Validation(
                "item material must not be empty".to_string(),
            ));
        }
        if self.amount == 0 || self.amount > MAX_STACK_AMOUNT {
            return Err(MailbagError::Validation(format!(
                "item amount must be between 1 and {MAX_STACK_AMOUNT}, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({}) x{}", self.material, self.amount),
            None => write!(f, "{} x{}", self.material, self.amount),
        }
    }
}

/// Serializes single attachments to and from the persisted section format.
pub trait ItemCodec: Send + Sync {
    /// Encode one item.
    fn encode(&self, item: &Item) -> Result<Value>;

    /// Decode one item.
    fn decode(&self, value: &Value) -> Result<Item>;
}

/// Codec storing items as plain JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonItemCodec;

impl ItemCodec for JsonItemCodec {
    fn encode(&self, item: &Item) -> Result<Value> {
        Ok(serde_json::to_value(item)?)
    }

    fn decode(&self, value: &Value) -> Result<Item> {
        let item: Item = serde_json::from_value(value.clone())?;
        item.validate()
            .map_err(|e| MailbagError::MalformedRecord(e.to_string()))?;
        Ok(item)
    }
}

/// Encode a list of items, failing on the first item the codec rejects.
pub fn encode_items(codec: &dyn ItemCodec, items: &[Item]) -> Result<Vec<Value>> {
    items.iter().map(|item| codec.encode(item)).collect()
}

/// Decode a list of items.
///
/// Undecodable entries are logged and dropped; `context` names the record
/// they came from.
pub fn decode_items(codec: &dyn ItemCodec, values: &[Value], context: &str) -> Vec<Item> {
    values
        .iter()
        .enumerate()
        .filter_map(|(slot, value)| match codec.decode(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Dropping attachment {} of {}: {}", slot, context, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_builder() {
        let item = Item::new("DIAMOND_SWORD", 1)
            .with_name("Excalibur")
            .with_lore("Sharp");
        assert_eq!(item.material, "DIAMOND_SWORD");
        assert_eq!(item.amount, 1);
        assert_eq!(item.name.as_deref(), Some("Excalibur"));
        assert_eq!(item.lore, vec!["Sharp".to_string()]);
    }

    #[test]
    fn test_item_display() {
        assert_eq!(Item::new("DIAMOND", 3).to_string(), "DIAMOND x3");
        assert_eq!(
            Item::new("PAPER", 1).with_name("Deed").to_string(),
            "Deed (PAPER) x1"
        );
    }

    #[test]
    fn test_validate_shape() {
        assert!(Item::new("STONE", 64).validate().is_ok());
        assert!(Item::new("", 1).validate().is_err());
        assert!(Item::new("STONE", 0).validate().is_err());
        assert!(Item::new("STONE", 65).validate().is_err());
    }

    #[test]
    fn test_json_codec_skips_empty_fields() {
        let value = JsonItemCodec.encode(&Item::new("STONE", 2)).unwrap();
        assert_eq!(value, json!({"material": "STONE", "amount": 2}));
    }

    #[test]
    fn test_json_codec_rejects_bad_shape() {
        let codec = JsonItemCodec;
        assert!(codec.decode(&json!({"material": "STONE"})).is_err());
        assert!(matches!(
            codec.decode(&json!({"material": "STONE", "amount": 0})),
            Err(MailbagError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_decode_items_drops_only_bad_entries() {
        let values = vec![
            json!({"material": "DIAMOND", "amount": 3}),
            json!("garbage"),
            json!({"material": "EMERALD", "amount": 1, "name": "Gem"}),
        ];
        let items = decode_items(&JsonItemCodec, &values, "mail #1");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Item::new("DIAMOND", 3));
        assert_eq!(items[1], Item::new("EMERALD", 1).with_name("Gem"));
    }
}
