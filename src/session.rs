//! Live-session registry.
//!
//! Tracks which identities are connected right now, which identities have
//! connected at least once since the server started, and the last display
//! name each of them used. Dynamic groups and delivery notifications read
//! from here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::sender::{fixed_display_name, Outbox};

/// Information about a connected identity.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Identity key.
    pub key: String,
    /// Display name used for this session.
    pub name: String,
    /// When the session was connected.
    pub connected_at: DateTime<Utc>,
    outbox: Outbox,
}

impl SessionInfo {
    /// Delivery channel of this session.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }
}

#[derive(Debug, Default)]
struct Sessions {
    online: HashMap<String, SessionInfo>,
    seen: HashMap<String, String>,
}

/// Registry of live sessions, shared by every component of a [`crate::Mailer`].
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Sessions>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected identity.
    ///
    /// Returns the receiving end of the identity's delivery channel. A second
    /// connect for the same key replaces the earlier session.
    pub async fn connect(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<String> {
        let key = key.into();
        let name = name.into();
        let (outbox, inbox) = mpsc::unbounded_channel();

        let mut sessions = self.inner.write().await;
        sessions.seen.insert(key.clone(), name.clone());
        sessions.online.insert(
            key.clone(),
            SessionInfo {
                key: key.clone(),
                name,
                connected_at: Utc::now(),
                outbox,
            },
        );
        debug!("Connected {} (online: {})", key, sessions.online.len());
        inbox
    }

    /// Unregister a session. Returns `false` if the key was not connected.
    pub async fn disconnect(&self, key: &str) -> bool {
        let mut sessions = self.inner.write().await;
        let removed = sessions.online.remove(key).is_some();
        if removed {
            debug!("Disconnected {} (online: {})", key, sessions.online.len());
        }
        removed
    }

    /// Check if an identity is currently connected.
    pub async fn is_connected(&self, key: &str) -> bool {
        self.inner
            .read()
            .await
            .online
            .get(key)
            .is_some_and(|info| !info.outbox.is_closed())
    }

    /// Get information about a connected identity.
    pub async fn get(&self, key: &str) -> Option<SessionInfo> {
        self.inner.read().await.online.get(key).cloned()
    }

    /// Deliver a line of text to a connected identity.
    ///
    /// Returns `false` when nobody received it.
    pub async fn deliver(&self, key: &str, text: &str) -> bool {
        let sessions = self.inner.read().await;
        match sessions.online.get(key) {
            Some(info) => info.outbox.send(text.to_string()).is_ok(),
            None => false,
        }
    }

    /// Keys of every identity connected right now, sorted.
    pub async fn connected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.online.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys of every identity connected at least once this server session, sorted.
    pub async fn ever_connected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.seen.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of identities connected right now.
    pub async fn count(&self) -> usize {
        self.inner.read().await.online.len()
    }

    /// Best known display name for an identity key.
    pub async fn display_name(&self, key: &str) -> String {
        if let Some(name) = fixed_display_name(key) {
            return name;
        }
        self.inner
            .read()
            .await
            .seen
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Display names for a list of keys, in order.
    pub async fn display_names(&self, keys: &[String]) -> Vec<String> {
        let mut names = Vec::with_capacity(keys.len());
        for key in keys {
            names.push(self.display_name(key).await);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::CONSOLE_KEY;

    #[tokio::test]
    async fn test_connect_disconnect() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.count().await, 0);

        let _inbox = registry.connect("u1", "alice").await;
        assert_eq!(registry.count().await, 1);
        assert!(registry.is_connected("u1").await);

        assert!(registry.disconnect("u1").await);
        assert!(!registry.disconnect("u1").await);
        assert!(!registry.is_connected("u1").await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_ever_connected_survives_disconnect() {
        let registry = SessionRegistry::new();
        let _a = registry.connect("u2", "bob").await;
        let _b = registry.connect("u1", "alice").await;
        registry.disconnect("u2").await;

        assert_eq!(registry.connected_keys().await, vec!["u1".to_string()]);
        assert_eq!(
            registry.ever_connected_keys().await,
            vec!["u1".to_string(), "u2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_deliver() {
        let registry = SessionRegistry::new();
        let mut inbox = registry.connect("u1", "alice").await;

        assert!(registry.deliver("u1", "ping").await);
        assert_eq!(inbox.recv().await.as_deref(), Some("ping"));
        assert!(!registry.deliver("u9", "ping").await);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_not_connected() {
        let registry = SessionRegistry::new();
        let inbox = registry.connect("u1", "alice").await;
        drop(inbox);
        assert!(!registry.is_connected("u1").await);
        assert!(!registry.deliver("u1", "ping").await);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let registry = SessionRegistry::new();
        let old = registry.connect("u1", "alice").await;
        let mut new = registry.connect("u1", "alice2").await;
        drop(old);

        assert_eq!(registry.count().await, 1);
        assert!(registry.deliver("u1", "hi").await);
        assert_eq!(new.recv().await.as_deref(), Some("hi"));
        assert_eq!(registry.display_name("u1").await, "alice2");
    }

    #[tokio::test]
    async fn test_display_name() {
        let registry = SessionRegistry::new();
        let _inbox = registry.connect("u1", "alice").await;
        registry.disconnect("u1").await;

        assert_eq!(registry.display_name("u1").await, "alice");
        assert_eq!(registry.display_name("unknown").await, "unknown");
        assert_eq!(registry.display_name(CONSOLE_KEY).await, "CONSOLE");
        assert_eq!(
            registry
                .display_names(&["u1".to_string(), "$block:door".to_string()])
                .await,
            vec!["alice".to_string(), "@door".to_string()]
        );
    }
}
