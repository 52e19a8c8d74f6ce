//! Backend API Abstraction
//!
//! The exchange, cache and guard logic only need a narrow slice of the REST
//! surface. [`ChatBackend`] is that slice as a trait, so the logic can be
//! exercised against scripted fakes; [`ApiClient`] is the reqwest-backed
//! implementation carrying the full endpoint surface.

mod client;

pub use client::ApiClient;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::models::{AuthUser, ChatRequest, Message};
use crate::stream::ChatStream;

/// The backend operations the chat core depends on
///
/// Implemented by [`ApiClient`] for the real backend and by fakes in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /auth/me` - confirm the session and fetch the current user.
    async fn me(&self) -> Result<AuthUser, ClientError>;

    /// `POST /auth/logout` - best-effort backend-side session invalidation.
    async fn logout(&self) -> Result<(), ClientError>;

    /// `GET /conversations/{id}/messages` - the authoritative message list.
    async fn fetch_messages(
        &self,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ClientError>;

    /// `POST /chat` - open one streaming exchange.
    async fn open_chat(&self, request: &ChatRequest) -> Result<ChatStream, ClientError>;
}
