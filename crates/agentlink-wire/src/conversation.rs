//! Conversation table: outbound requests correlated with their results.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::message::A2aEnvelope;

/// A completed exchange, keyed by `conversationId`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// The request envelope as sent.
    pub request: A2aEnvelope,
    /// The peer's result (or error object).
    pub result: serde_json::Value,
    /// When the exchange was recorded.
    pub timestamp: DateTime<Utc>,
}

/// In-memory conversation store.
///
/// Bounded by `max_entries` (oldest evicted first). Entries older than `ttl`
/// are swept lazily on the next insert.
#[derive(Debug)]
pub struct ConversationStore {
    entries: Mutex<HashMap<String, Conversation>>,
    max_entries: usize,
    ttl: Duration,
}

impl ConversationStore {
    /// Create a store with a capacity and a time-to-live.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Record an exchange. Last write wins for a repeated id.
    pub fn insert(&self, conversation_id: String, conversation: Conversation) {
        let now = conversation.timestamp;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let ttl = self.ttl;
        entries.retain(|_, c| now - c.timestamp < ttl);

        while entries.len() >= self.max_entries && !entries.contains_key(&conversation_id) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, c)| c.timestamp)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
        entries.insert(conversation_id, conversation);
    }

    /// Look up a conversation.
    pub fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
    }

    /// Number of retained conversations.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(1000, Duration::hours(1))
    }
}
