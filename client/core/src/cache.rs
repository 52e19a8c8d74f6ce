//! Conversation State Cache
//!
//! Gives the UI a consistent, low-latency view of "messages in the active
//! conversation" across the optimistic-update / stream / reconciliation
//! cycle. The cache is deliberately simple: it is considered stale the
//! moment a conversation is activated (every activation refetches), and
//! reconciliation is invalidate-and-refetch rather than patching server ids
//! into place.
//!
//! Invariants:
//! - at most one optimistic (id -1) entry exists per conversation at a time;
//! - after [`MessageCache::reconcile`] completes, no cached message carries
//!   the sentinel id, on the success and the failure path alike.

use std::sync::Arc;

use dashmap::DashMap;

use crate::api::ChatBackend;
use crate::error::ClientError;
use crate::models::Message;

/// Page size used when fetching a conversation's messages
pub const DEFAULT_MESSAGE_LIMIT: u32 = 100;

/// Shared per-conversation message cache
///
/// Cheap to clone; clones share the same underlying map. One clone is wired
/// to session teardown so an expired session leaves nothing behind.
#[derive(Clone, Default)]
pub struct MessageCache {
    entries: Arc<DashMap<i64, Vec<Message>>>,
}

impl MessageCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and cache the message list for an activated conversation.
    ///
    /// The cache is considered stale immediately: every activation refetches
    /// so another session's edits are never shown from a stale copy.
    ///
    /// # Errors
    ///
    /// Propagates the fetch failure; the previously cached entry (if any) is
    /// left untouched in that case.
    pub async fn list_messages<A>(
        &self,
        api: &A,
        conversation_id: i64,
    ) -> Result<Vec<Message>, ClientError>
    where
        A: ChatBackend + ?Sized,
    {
        let messages = api
            .fetch_messages(conversation_id, DEFAULT_MESSAGE_LIMIT, 0)
            .await?;
        self.entries.insert(conversation_id, messages.clone());
        Ok(messages)
    }

    /// The cached list for a conversation, if one is present.
    #[must_use]
    pub fn cached(&self, conversation_id: i64) -> Option<Vec<Message>> {
        self.entries.get(&conversation_id).map(|entry| entry.clone())
    }

    /// Insert the optimistic user message at the tail of the cached list.
    ///
    /// Called before the stream starts so the user sees their own message
    /// immediately. Any prior sentinel entry is replaced, keeping at most
    /// one outstanding optimistic message.
    pub fn append_optimistic(&self, conversation_id: i64, content: &str) -> Message {
        let message = Message::optimistic(content);
        let mut entry = self.entries.entry(conversation_id).or_default();
        entry.retain(|m| !m.is_optimistic());
        entry.push(message.clone());
        message
    }

    /// Discard the cached list and refetch the authoritative one.
    ///
    /// Must run exactly once per send attempt, after the stream reached a
    /// terminal state - success or failure - so a failed exchange never
    /// leaves a phantom optimistic message behind. The entry is dropped
    /// before the refetch: even when the refetch itself fails, the sentinel
    /// is gone.
    ///
    /// # Errors
    ///
    /// Propagates the refetch failure.
    pub async fn reconcile<A>(
        &self,
        api: &A,
        conversation_id: i64,
    ) -> Result<Vec<Message>, ClientError>
    where
        A: ChatBackend + ?Sized,
    {
        self.entries.remove(&conversation_id);
        let messages = api
            .fetch_messages(conversation_id, DEFAULT_MESSAGE_LIMIT, 0)
            .await?;
        self.entries.insert(conversation_id, messages.clone());
        Ok(messages)
    }

    /// Whether a conversation currently has an optimistic entry cached.
    #[must_use]
    pub fn has_optimistic(&self, conversation_id: i64) -> bool {
        self.entries
            .get(&conversation_id)
            .is_some_and(|entry| entry.iter().any(Message::is_optimistic))
    }

    /// Drop a single conversation's cached list.
    pub fn invalidate(&self, conversation_id: i64) {
        self.entries.remove(&conversation_id);
    }

    /// Drop everything. Wired to session teardown.
    pub fn clear(&self) {
        self.entries.clear();
        tracing::debug!("message cache cleared");
    }

    /// Number of conversations with a cached list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
