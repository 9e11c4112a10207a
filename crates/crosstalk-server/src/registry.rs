//! In-memory Session Registry: identity ↔ live transport bindings.

use crosstalk_types::OutboundEvent;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Type alias for the session map to satisfy clippy complexity checks.
type SessionMap = HashMap<String, (Uuid, mpsc::Sender<String>)>;

/// Directory of live sessions: username -> (session_id, outbound sender).
///
/// At most one session per identity. The session id is the guard against
/// the disconnect/re-register race: a disconnect removes a binding only if
/// it still owns it, so a late disconnect of a replaced transport cannot
/// evict the newer session. The raw map is never exposed.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Binds an identity to a transport, replacing any prior binding for
    /// that identity. Returns the new session id.
    pub async fn register(&self, username: String, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        if let Some((replaced, _)) = sessions.insert(username.clone(), (session_id, sender)) {
            tracing::info!(
                username = %username,
                replaced_session = %replaced,
                "replaced existing session for identity"
            );
        }
        session_id
    }

    /// Removes the binding for `username` if `session_id` still owns it.
    ///
    /// Returns whether a removal occurred. A stale id (the binding was
    /// replaced) or an absent binding (already removed) is a no-op.
    pub async fn remove(&self, username: &str, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(username) {
            Some((current, _)) if *current == session_id => {
                sessions.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Whether the identity currently has a live session.
    pub async fn is_online(&self, username: &str) -> bool {
        self.sessions.read().await.contains_key(username)
    }

    /// Sends a serialized event to an identity's session, if any.
    ///
    /// Returns whether a session existed. Delivery to a slow consumer may
    /// still drop the message; that is logged, not reported, matching the
    /// best-effort outbound contract.
    pub async fn send(&self, username: &str, message_json: String) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(username) {
            Some((_, sender)) => {
                if let Err(e) = sender.try_send(message_json) {
                    tracing::warn!(
                        username = %username,
                        "dropping outbound event for slow consumer: {}",
                        e
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Serializes and sends an event to an identity's session, if any.
    pub async fn send_event(&self, username: &str, event: &OutboundEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(username, json).await,
            Err(e) => {
                tracing::error!("failed to serialize outbound event: {}", e);
                false
            }
        }
    }
}
