//! Backend API Client
//!
//! Typed endpoint surface over the [`Transport`]: auth, conversations, chat,
//! admin and system-prompt presets. Grouped the way the backend routes are.

use async_trait::async_trait;
use serde_json::json;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::models::{
    AuthUser, ChatRequest, Conversation, LoginOutcome, LoginResponse, Message, NewSystemPrompt,
    SystemPrompt, SystemPromptUpdate, TokenPair, TwoFactorSetup,
};
use crate::session::SessionHandle;
use crate::stream::ChatStream;
use crate::transport::Transport;

use super::ChatBackend;

/// Reqwest-backed client for the full backend REST surface
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] when the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self, ClientError> {
        Ok(Self {
            transport: Transport::new(config, session)?,
        })
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// `POST /auth/login`.
    ///
    /// # Errors
    ///
    /// `Validation` on bad credentials, plus the usual transport failures.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ClientError> {
        let response: LoginResponse = self
            .transport
            .post("/auth/login", &json!({ "email": email, "password": password }))
            .await?;
        LoginOutcome::from_response(response)
    }

    /// `POST /auth/verify-2fa` - finish a login that needed a second factor.
    ///
    /// # Errors
    ///
    /// `Validation` on a wrong or expired code.
    pub async fn verify_2fa(
        &self,
        session_token: &str,
        totp_code: &str,
    ) -> Result<TokenPair, ClientError> {
        self.transport
            .post(
                "/auth/verify-2fa",
                &json!({ "session_token": session_token, "totp_code": totp_code }),
            )
            .await
    }

    /// `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// `Validation` when the email is taken or the password too weak.
    pub async fn register(&self, email: &str, password: &str) -> Result<(), ClientError> {
        self.transport
            .post_unit(
                "/auth/register",
                Some(&json!({ "email": email, "password": password })),
            )
            .await
    }

    /// `POST /auth/change-password`.
    ///
    /// # Errors
    ///
    /// `Validation` when the current password does not match.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        self.transport
            .post_unit(
                "/auth/change-password",
                Some(&json!({
                    "current_password": current_password,
                    "new_password": new_password,
                })),
            )
            .await
    }

    /// `POST /auth/2fa/setup` - enroll a TOTP second factor.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a session.
    pub async fn setup_2fa(&self) -> Result<TwoFactorSetup, ClientError> {
        self.transport
            .post("/auth/2fa/setup", &json!({}))
            .await
    }

    // ========================================================================
    // Conversations
    // ========================================================================

    /// `GET /conversations`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a session.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.transport.get("/conversations").await
    }

    /// `POST /conversations`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a session.
    pub async fn create_conversation(&self, title: &str) -> Result<Conversation, ClientError> {
        self.transport
            .post("/conversations", &json!({ "title": title }))
            .await
    }

    /// `GET /conversations/{id}`.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for another user's conversation.
    pub async fn conversation(&self, id: i64) -> Result<Conversation, ClientError> {
        self.transport.get(&format!("/conversations/{id}")).await
    }

    /// `PATCH /conversations/{id}` - rename.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for another user's conversation.
    pub async fn rename_conversation(
        &self,
        id: i64,
        title: &str,
    ) -> Result<Conversation, ClientError> {
        self.transport
            .patch(&format!("/conversations/{id}"), &json!({ "title": title }))
            .await
    }

    /// `DELETE /conversations/{id}` - cascades to owned messages server-side.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for another user's conversation.
    pub async fn delete_conversation(&self, id: i64) -> Result<(), ClientError> {
        self.transport.delete(&format!("/conversations/{id}")).await
    }

    /// `GET /conversations/{id}/messages`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a session.
    pub async fn messages(
        &self,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ClientError> {
        self.transport
            .get(&format!(
                "/conversations/{conversation_id}/messages?limit={limit}&offset={offset}"
            ))
            .await
    }

    // ========================================================================
    // Chat
    // ========================================================================

    /// `POST /chat` - open a streaming exchange.
    ///
    /// The response is consumed incrementally; see [`ChatStream`].
    ///
    /// # Errors
    ///
    /// [`ClientError::ChatStatus`] when the endpoint refuses the exchange,
    /// `Unauthorized` on 401.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        let response = self.transport.post_stream("/chat", request).await?;
        Ok(ChatStream::from_response(response))
    }

    // ========================================================================
    // Admin
    // ========================================================================

    /// `GET /admin/users`.
    ///
    /// # Errors
    ///
    /// `Validation` (403) without the admin role.
    pub async fn admin_users(&self, limit: u32, offset: u32) -> Result<Vec<AuthUser>, ClientError> {
        self.transport
            .get(&format!("/admin/users?limit={limit}&offset={offset}"))
            .await
    }

    /// `PATCH /admin/users/{id}` - toggle `active` and/or change `role`.
    ///
    /// # Errors
    ///
    /// `Validation` (403) without the admin role.
    pub async fn admin_update_user(
        &self,
        user_id: i64,
        active: Option<bool>,
        role: Option<&str>,
    ) -> Result<AuthUser, ClientError> {
        let mut path = format!("/admin/users/{user_id}?");
        if let Some(active) = active {
            path.push_str(&format!("active={active}&"));
        }
        if let Some(role) = role {
            path.push_str(&format!("role={role}&"));
        }
        let path = path.trim_end_matches(['?', '&']).to_string();
        self.transport.patch(&path, &json!({})).await
    }

    /// `GET /admin/conversations`, optionally filtered by owner.
    ///
    /// # Errors
    ///
    /// `Validation` (403) without the admin role.
    pub async fn admin_conversations(
        &self,
        user_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, ClientError> {
        let mut path = format!("/admin/conversations?limit={limit}&offset={offset}");
        if let Some(user_id) = user_id {
            path.push_str(&format!("&user_id={user_id}"));
        }
        self.transport.get(&path).await
    }

    /// `GET /admin/conversations/{id}/messages`.
    ///
    /// # Errors
    ///
    /// `Validation` (403) without the admin role.
    pub async fn admin_conversation_messages(
        &self,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ClientError> {
        self.transport
            .get(&format!(
                "/admin/conversations/{conversation_id}/messages?limit={limit}&offset={offset}"
            ))
            .await
    }

    /// `POST /admin/conversations/{id}/reassign`.
    ///
    /// # Errors
    ///
    /// `Validation` (403) without the admin role.
    pub async fn reassign_conversation(
        &self,
        conversation_id: i64,
        target_user_id: i64,
    ) -> Result<(), ClientError> {
        self.transport
            .post_unit(
                &format!("/admin/conversations/{conversation_id}/reassign"),
                Some(&json!({ "target_user_id": target_user_id })),
            )
            .await
    }

    // ========================================================================
    // System prompts
    // ========================================================================

    /// `GET /prompts`.
    ///
    /// # Errors
    ///
    /// `Unauthorized` without a session.
    pub async fn prompts(&self, limit: u32, offset: u32) -> Result<Vec<SystemPrompt>, ClientError> {
        self.transport
            .get(&format!("/prompts?limit={limit}&offset={offset}"))
            .await
    }

    /// `GET /prompts/{id}`.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for an unknown preset.
    pub async fn prompt(&self, id: i64) -> Result<SystemPrompt, ClientError> {
        self.transport.get(&format!("/prompts/{id}")).await
    }

    /// `POST /prompts`.
    ///
    /// # Errors
    ///
    /// `Validation` on a duplicate name.
    pub async fn create_prompt(&self, prompt: &NewSystemPrompt) -> Result<SystemPrompt, ClientError> {
        self.transport.post("/prompts", prompt).await
    }

    /// `PUT /prompts/{id}`.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for an unknown preset.
    pub async fn update_prompt(
        &self,
        id: i64,
        update: &SystemPromptUpdate,
    ) -> Result<SystemPrompt, ClientError> {
        self.transport.put(&format!("/prompts/{id}"), update).await
    }

    /// `DELETE /prompts/{id}`.
    ///
    /// # Errors
    ///
    /// `Validation` (404) for an unknown preset.
    pub async fn delete_prompt(&self, id: i64) -> Result<(), ClientError> {
        self.transport.delete(&format!("/prompts/{id}")).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn me(&self) -> Result<AuthUser, ClientError> {
        self.transport.get("/auth/me").await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.transport
            .post_unit::<()>("/auth/logout", None)
            .await
    }

    async fn fetch_messages(
        &self,
        conversation_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ClientError> {
        self.messages(conversation_id, limit, offset).await
    }

    async fn open_chat(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        self.chat(request).await
    }
}
