//! Chat Client and Exchange Orchestration
//!
//! [`ChatClient`] is the headless facade a UI surface drives: it owns the
//! injected [`SessionHandle`] and the shared [`MessageCache`], performs the
//! who-am-I check and the logout sequence, and hands out per-conversation
//! [`ChatSession`]s.
//!
//! [`ChatSession::send`] is one full exchange cycle:
//!
//! 1. guard check (authenticated, prompt non-empty, nothing pending)
//! 2. optimistic insert of the user message into the cache
//! 3. open the streaming chat request
//! 4. forward each fragment to the caller in order while accumulating
//! 5. reconcile the cache - on success and on failure alike
//!
//! The `pending` flag is raised for the whole cycle and dropped on every
//! exit path. If the session is torn down while the stream is in flight,
//! the current read finishes but the result is discarded and reconciliation
//! is skipped - teardown already cleared the cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::api::ChatBackend;
use crate::cache::MessageCache;
use crate::error::ClientError;
use crate::models::{AuthUser, ChatRequest, Message};
use crate::session::SessionHandle;

/// Correlation id for one send attempt
///
/// Purely client-side; shows up in logs so one exchange's lines can be
/// followed across transport, stream and reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form is enough for log correlation.
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Observable send-in-flight flag
///
/// Cloneable view over a [`ChatSession`]'s pending state, so a UI can
/// disable its send affordances while an exchange runs.
#[derive(Clone, Debug, Default)]
pub struct PendingFlag {
    pending: Arc<AtomicBool>,
}

impl PendingFlag {
    /// Whether a send is currently in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn raise(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    fn drop_flag(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Headless chat client facade
pub struct ChatClient<A: ChatBackend> {
    api: Arc<A>,
    session: SessionHandle,
    cache: MessageCache,
}

impl<A: ChatBackend> ChatClient<A> {
    /// Wire a client together: the cache is cleared automatically whenever
    /// the session is torn down.
    pub fn new(api: A, session: SessionHandle) -> Self {
        let cache = MessageCache::new();
        let teardown_cache = cache.clone();
        session.on_teardown(move || teardown_cache.clear());

        Self {
            api: Arc::new(api),
            session,
            cache,
        }
    }

    /// The injected session handle.
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The shared message cache.
    #[must_use]
    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// The backend the client talks to.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run the who-am-I query and move the session state accordingly.
    ///
    /// A confirmed user transitions to authenticated. Any failure - 401 or
    /// not - tears the session down, matching the route guard's behavior;
    /// non-auth failures are additionally surfaced to the caller.
    ///
    /// # Errors
    ///
    /// The underlying transport error for non-auth failures. A plain 401
    /// yields `Ok(None)`.
    pub async fn check_auth(&self) -> Result<Option<AuthUser>, ClientError> {
        match self.api.me().await {
            Ok(user) => {
                self.session.authenticate(user.clone());
                Ok(Some(user))
            }
            Err(err) => {
                self.session.expire();
                if err.is_auth() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Log out: clear local state first, then notify the backend
    /// best-effort, then always emit the logged-out event. A network failure
    /// never blocks logout.
    pub async fn logout(&self) {
        self.session.clear_for_logout();
        if let Err(err) = self.api.logout().await {
            tracing::debug!(error = %err, "logout notify failed");
        }
        self.session.emit_logged_out();
    }

    /// Open a per-conversation chat session.
    #[must_use]
    pub fn open_conversation(&self, conversation_id: i64) -> ChatSession<A> {
        ChatSession {
            api: Arc::clone(&self.api),
            session: self.session.clone(),
            cache: self.cache.clone(),
            conversation_id,
            pending: PendingFlag::default(),
            streamed: String::new(),
            last_error: None,
        }
    }
}

/// One conversation's exchange state
///
/// At most one send may be in flight per conversation; the [`PendingFlag`]
/// tells the UI to disable its send affordances while that holds. The
/// transient in-progress assistant text lives here, not in the cache - the
/// cache only ever holds backend truth plus the single optimistic entry.
pub struct ChatSession<A: ChatBackend> {
    api: Arc<A>,
    session: SessionHandle,
    cache: MessageCache,
    conversation_id: i64,
    pending: PendingFlag,
    streamed: String,
    last_error: Option<String>,
}

impl<A: ChatBackend> ChatSession<A> {
    /// The conversation this session belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    /// Observable pending flag for UI affordances.
    #[must_use]
    pub fn pending_flag(&self) -> PendingFlag {
        self.pending.clone()
    }

    /// Whether a send is currently in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// The in-progress assistant text of the current or last exchange.
    #[must_use]
    pub fn streamed(&self) -> &str {
        &self.streamed
    }

    /// Human-readable description of the last failed exchange, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fetch (and cache) the conversation's messages on activation.
    ///
    /// # Errors
    ///
    /// Propagates the fetch failure.
    pub async fn list_messages(&self) -> Result<Vec<Message>, ClientError> {
        self.cache.list_messages(self.api.as_ref(), self.conversation_id).await
    }

    /// The cached message list, if one is present.
    #[must_use]
    pub fn cached_messages(&self) -> Option<Vec<Message>> {
        self.cache.cached(self.conversation_id)
    }

    /// Run one full exchange cycle. See the module docs for the sequence.
    ///
    /// `on_chunk` observes every fragment, in arrival order, exactly once.
    /// The returned aggregate equals the concatenation of those fragments.
    ///
    /// # Errors
    ///
    /// [`ClientError::EmptyPrompt`], [`ClientError::SendPending`],
    /// [`ClientError::Unauthorized`] before anything is sent;
    /// [`ClientError::ChatStatus`] / [`ClientError::Stream`] /
    /// [`ClientError::Aborted`] from the stream. The cache is reconciled on
    /// every path that got as far as the optimistic insert.
    pub async fn send<F>(
        &mut self,
        prompt: &str,
        system: Option<&str>,
        prompt_id: Option<i64>,
        on_chunk: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }
        self.session.require_authenticated()?;
        if !self.pending.raise() {
            return Err(ClientError::SendPending);
        }

        let exchange_id = ExchangeId::new();
        let epoch = self.session.epoch();
        self.streamed.clear();
        self.last_error = None;

        tracing::debug!(
            exchange = %exchange_id,
            conversation = self.conversation_id,
            "starting exchange"
        );

        let mut result = self
            .run_exchange(exchange_id, prompt, system, prompt_id, on_chunk)
            .await;

        if self.session.epoch() == epoch && self.session.is_authenticated() {
            // Reconcile exactly once, on success and failure alike, so a
            // failed exchange never leaves the optimistic entry behind.
            if let Err(err) = self
                .cache
                .reconcile(self.api.as_ref(), self.conversation_id)
                .await
            {
                tracing::warn!(
                    exchange = %exchange_id,
                    conversation = self.conversation_id,
                    error = %err,
                    "reconcile after exchange failed"
                );
            }
        } else {
            // Session torn down mid-flight: the backend result is stale.
            tracing::debug!(exchange = %exchange_id, "session lost mid-exchange, discarding result");
            self.streamed.clear();
            result = Err(ClientError::Unauthorized);
        }

        self.pending.drop_flag();

        match &result {
            Ok(aggregate) => {
                tracing::debug!(
                    exchange = %exchange_id,
                    chars = aggregate.len(),
                    "exchange complete"
                );
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
            }
        }

        result
    }

    async fn run_exchange<F>(
        &mut self,
        exchange_id: ExchangeId,
        prompt: &str,
        system: Option<&str>,
        prompt_id: Option<i64>,
        mut on_chunk: F,
    ) -> Result<String, ClientError>
    where
        F: FnMut(&str),
    {
        self.cache.append_optimistic(self.conversation_id, prompt);

        let mut request = ChatRequest::new(self.conversation_id, prompt);
        if let Some(system) = system {
            request = request.with_system(system);
        }
        if let Some(prompt_id) = prompt_id {
            request = request.with_prompt_id(prompt_id);
        }

        let mut stream = self.api.open_chat(&request).await?;

        while let Some(fragment) = stream.next().await {
            let text = fragment.map_err(|err| {
                tracing::warn!(exchange = %exchange_id, error = %err, "stream failed");
                err
            })?;
            self.streamed.push_str(&text);
            on_chunk(&text);
        }

        Ok(stream.into_aggregate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_display_is_short() {
        let id = ExchangeId::new();
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn test_pending_flag_raise_and_drop() {
        let flag = PendingFlag::default();
        assert!(!flag.is_pending());
        assert!(flag.raise());
        assert!(flag.is_pending());
        // A second raise while held fails.
        assert!(!flag.raise());
        flag.drop_flag();
        assert!(!flag.is_pending());
        assert!(flag.raise());
    }
}
