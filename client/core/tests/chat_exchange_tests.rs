//! Exchange cycle integration tests
//!
//! Drives the full send cycle - guard check, optimistic insert, streaming,
//! reconciliation - against a scripted backend fake, the same seam the
//! real `ApiClient` implements.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use charla_client::{
    AuthUser, ChatBackend, ChatClient, ChatRequest, ChatStream, ClientError, Message, MessageRole,
    PendingFlag, SessionHandle,
};

/// Scripted backend: serves configured fragments, persists the exchange the
/// way the real backend would, and records every message fetch.
struct FakeBackend {
    /// Fragments the chat stream will deliver, as raw body chunks
    fragments: Vec<Vec<u8>>,
    /// Respond to the chat POST with this non-success status
    chat_status: Option<u16>,
    /// Fail the body mid-stream after delivering the fragments
    fail_mid_stream: bool,
    /// Tear this session down while handling the chat POST
    expire_on_open: Option<SessionHandle>,
    /// Observe this flag while handling the chat POST
    probe: Mutex<Option<PendingFlag>>,
    probe_seen: Mutex<Option<bool>>,

    server_messages: Mutex<Vec<Message>>,
    fetch_log: Mutex<Vec<i64>>,
    next_id: AtomicI64,
}

impl FakeBackend {
    fn streaming(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.as_bytes().to_vec()).collect(),
            chat_status: None,
            fail_mid_stream: false,
            expire_on_open: None,
            probe: Mutex::new(None),
            probe_seen: Mutex::new(None),
            server_messages: Mutex::new(Vec::new()),
            fetch_log: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn refusing(status: u16) -> Self {
        Self {
            chat_status: Some(status),
            ..Self::streaming(&[])
        }
    }

    fn failing_mid_stream(fragments: &[&str]) -> Self {
        Self {
            fail_mid_stream: true,
            ..Self::streaming(fragments)
        }
    }

    fn fetch_log(&self) -> Vec<i64> {
        self.fetch_log.lock().clone()
    }

    fn watch_pending(&self, flag: PendingFlag) {
        *self.probe.lock() = Some(flag);
    }

    fn pending_seen_at_open(&self) -> Option<bool> {
        *self.probe_seen.lock()
    }

    fn persist(&self, role: MessageRole, content: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.server_messages.lock().push(Message {
            id,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn me(&self) -> Result<AuthUser, ClientError> {
        Err(ClientError::Unauthorized)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn fetch_messages(
        &self,
        conversation_id: i64,
        _limit: u32,
        _offset: u32,
    ) -> Result<Vec<Message>, ClientError> {
        self.fetch_log.lock().push(conversation_id);
        Ok(self.server_messages.lock().clone())
    }

    async fn open_chat(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        if let Some(flag) = self.probe.lock().as_ref() {
            *self.probe_seen.lock() = Some(flag.is_pending());
        }
        if let Some(session) = &self.expire_on_open {
            session.expire();
        }
        if let Some(status) = self.chat_status {
            return Err(ClientError::ChatStatus { status });
        }

        // The backend persists both sides of the exchange.
        self.persist(MessageRole::User, &request.prompt);
        let full: String = self
            .fragments
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        self.persist(MessageRole::Assistant, &full);

        let mut chunks: Vec<Result<Bytes, ClientError>> = self
            .fragments
            .iter()
            .map(|f| Ok(Bytes::from(f.clone())))
            .collect();
        if self.fail_mid_stream {
            chunks.push(Err(ClientError::Stream {
                message: "connection reset by peer".to_string(),
            }));
        }
        Ok(ChatStream::from_bytes(tokio_stream::iter(chunks)))
    }
}

fn test_user() -> AuthUser {
    AuthUser {
        id: 7,
        email: "ana@example.com".to_string(),
        role: "user".to_string(),
        active: true,
        created_at: None,
    }
}

fn signed_in_client(api: FakeBackend) -> ChatClient<FakeBackend> {
    let (session, _events) = SessionHandle::new();
    session.authenticate(test_user());
    ChatClient::new(api, session)
}

#[tokio::test]
async fn test_hola_scenario() {
    let api = FakeBackend::streaming(&["Hola", ", ¿en", " qué puedo ayudarte?"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(42);

    let mut chunks = Vec::new();
    let aggregate = chat
        .send("hola", None, None, |chunk| chunks.push(chunk.to_string()))
        .await
        .unwrap();

    assert_eq!(chunks, vec!["Hola", ", ¿en", " qué puedo ayudarte?"]);
    assert_eq!(aggregate, "Hola, ¿en qué puedo ayudarte?");

    // Exactly one post-completion refetch, for conversation 42.
    assert_eq!(client.api().fetch_log(), vec![42]);

    // The cache now holds backend truth: durable ids only.
    let cached = client.cache().cached(42).unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|m| m.id > 0));
    assert_eq!(cached[1].content, "Hola, ¿en qué puedo ayudarte?");
}

#[tokio::test]
async fn test_chat_refused_with_500() {
    let api = FakeBackend::refusing(500);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(42);

    let mut chunks = Vec::new();
    let result = chat
        .send("hola", None, None, |chunk| chunks.push(chunk.to_string()))
        .await;

    // No fragments were delivered and the failure is typed.
    assert!(chunks.is_empty());
    assert!(matches!(result, Err(ClientError::ChatStatus { status: 500 })));

    // The cache was still reconciled: the optimistic entry is gone.
    assert_eq!(client.api().fetch_log(), vec![42]);
    assert!(!client.cache().has_optimistic(42));
    assert_eq!(chat.last_error().unwrap(), "chat request failed with status 500");
}

#[tokio::test]
async fn test_mid_stream_failure_reconciles() {
    let api = FakeBackend::failing_mid_stream(&["par", "tial"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(9);

    let mut chunks = Vec::new();
    let result = chat
        .send("hola", None, None, |chunk| chunks.push(chunk.to_string()))
        .await;

    // Fragments before the failure were delivered in order.
    assert_eq!(chunks, vec!["par", "tial"]);
    assert!(matches!(result, Err(ClientError::Stream { .. })));

    // Reconciliation ran on the failure path; no sentinel survives.
    assert_eq!(client.api().fetch_log(), vec![9]);
    assert!(!client.cache().has_optimistic(9));
}

#[tokio::test]
async fn test_send_requires_authentication() {
    let api = FakeBackend::streaming(&["nunca"]);
    let (session, _events) = SessionHandle::new();
    let client = ChatClient::new(api, session);
    let mut chat = client.open_conversation(1);

    let result = chat.send("hola", None, None, |_| {}).await;

    assert!(matches!(result, Err(ClientError::Unauthorized)));
    // Nothing was inserted and nothing was fetched.
    assert!(client.cache().is_empty());
    assert!(client.api().fetch_log().is_empty());
}

#[tokio::test]
async fn test_empty_prompt_rejected() {
    let api = FakeBackend::streaming(&["nunca"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(1);

    let result = chat.send("   ", None, None, |_| {}).await;

    assert!(matches!(result, Err(ClientError::EmptyPrompt)));
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_pending_flag_held_for_exchange() {
    let api = FakeBackend::streaming(&["ok"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(1);

    client.api().watch_pending(chat.pending_flag());
    assert!(!chat.is_pending());

    chat.send("hola", None, None, |_| {}).await.unwrap();

    // The flag was up while the chat request was being opened, and is down
    // again on exit.
    assert_eq!(client.api().pending_seen_at_open(), Some(true));
    assert!(!chat.is_pending());
}

#[tokio::test]
async fn test_session_lost_mid_exchange_discards_result() {
    let (session, _events) = SessionHandle::new();
    session.authenticate(test_user());

    let mut api = FakeBackend::streaming(&["ya", " no importa"]);
    api.expire_on_open = Some(session.clone());
    let client = ChatClient::new(api, session);
    let mut chat = client.open_conversation(5);

    let result = chat.send("hola", None, None, |_| {}).await;

    // The stream was consumed, but the result is discarded.
    assert!(matches!(result, Err(ClientError::Unauthorized)));
    assert_eq!(chat.streamed(), "");

    // Reconciliation was skipped: teardown already cleared the cache, and a
    // refetch would just 401 again.
    assert!(client.api().fetch_log().is_empty());
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_system_prompt_override_forwarded() {
    let api = FakeBackend::streaming(&["sí"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(3);

    chat.send("hola", Some("Eres un asistente útil."), Some(12), |_| {})
        .await
        .unwrap();

    // The user message was persisted verbatim by the backend fake.
    let cached = client.cache().cached(3).unwrap();
    assert_eq!(cached[0].content, "hola");
    assert_eq!(cached[0].role, MessageRole::User);
}

#[tokio::test]
async fn test_sequential_sends_reuse_session() {
    let api = FakeBackend::streaming(&["uno"]);
    let client = signed_in_client(api);
    let mut chat = client.open_conversation(2);

    chat.send("primera", None, None, |_| {}).await.unwrap();
    chat.send("segunda", None, None, |_| {}).await.unwrap();

    // One reconcile fetch per send.
    assert_eq!(client.api().fetch_log(), vec![2, 2]);
    assert!(!chat.is_pending());

    // Four persisted messages, no sentinel.
    let cached = client.cache().cached(2).unwrap();
    assert_eq!(cached.len(), 4);
    assert!(cached.iter().all(|m| !m.is_optimistic()));
}
