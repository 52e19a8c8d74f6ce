//! Domain and Wire Types
//!
//! Types exchanged with the backend REST API. Field names match the wire
//! format directly; unknown fields in responses are ignored so the client
//! stays compatible when the backend grows new columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Sentinel id for a message that exists only in the local cache.
///
/// The backend never assigns negative ids, so -1 unambiguously marks the
/// single outstanding optimistic entry. Reconciliation replaces it with the
/// durable record.
pub const OPTIMISTIC_MESSAGE_ID: i64 = -1;

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human user
    User,
    /// The model
    Assistant,
}

/// A message within a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend-assigned id, or [`OPTIMISTIC_MESSAGE_ID`] before persistence
    pub id: i64,
    /// Who sent this message
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create the locally-synthesized user message shown before backend
    /// confirmation.
    #[must_use]
    pub fn optimistic(content: impl Into<String>) -> Self {
        Self {
            id: OPTIMISTIC_MESSAGE_ID,
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether this message is the optimistic sentinel entry.
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.id == OPTIMISTIC_MESSAGE_ID
    }
}

/// A conversation owned by the current user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Backend-assigned id
    pub id: i64,
    /// Title (may be empty for freshly created conversations)
    pub title: String,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// The authenticated user as reported by `GET /auth/me`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Backend-assigned id
    pub id: i64,
    /// Login email
    pub email: String,
    /// Role string ("user", "admin", ...)
    pub role: String,
    /// Whether the account is enabled
    pub active: bool,
    /// Account creation time, when the endpoint reports it
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Whether this user carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Access/refresh token pair returned on full sign-in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token
    pub access_token: String,
    /// Longer-lived refresh token
    pub refresh_token: String,
}

/// Raw login response as the backend sends it
///
/// Either a full token pair (no second factor configured) or a short-lived
/// `session_token` to be exchanged together with a TOTP code.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginResponse {
    /// Whether a TOTP code is required to finish signing in
    #[serde(default)]
    pub needs_2fa: bool,
    /// Access token, present when no second factor is required
    #[serde(default)]
    pub access_token: Option<String>,
    /// Refresh token, present when no second factor is required
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Opaque token for the 2FA verification step
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Outcome of a login attempt
#[derive(Clone, Debug, PartialEq)]
pub enum LoginOutcome {
    /// Signed in; the session cookie is established.
    SignedIn(TokenPair),
    /// A TOTP code must be verified before the session is established.
    NeedsSecondFactor {
        /// Token to present to `POST /auth/verify-2fa`
        session_token: String,
    },
}

impl LoginOutcome {
    /// Interpret the backend's login response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedResponse`] when the response is
    /// missing the fields its `needs_2fa` flag promises.
    pub fn from_response(response: LoginResponse) -> Result<Self, ClientError> {
        if response.needs_2fa {
            let session_token = response.session_token.ok_or_else(|| {
                ClientError::UnexpectedResponse(
                    "login requires 2fa but carried no session_token".to_string(),
                )
            })?;
            return Ok(Self::NeedsSecondFactor { session_token });
        }

        match (response.access_token, response.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(Self::SignedIn(TokenPair {
                access_token,
                refresh_token,
            })),
            _ => Err(ClientError::UnexpectedResponse(
                "login response carried neither tokens nor a 2fa challenge".to_string(),
            )),
        }
    }
}

/// Result of `POST /auth/2fa/setup`
#[derive(Clone, Debug, Deserialize)]
pub struct TwoFactorSetup {
    /// QR code (data URI) to scan with an authenticator app
    pub qr_code: String,
    /// The TOTP secret in plain form, for manual entry
    pub secret: String,
}

/// A named system-prompt preset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// Backend-assigned id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// The prompt text sent as the system message
    pub content: String,
    /// Whether this preset is the default selection
    #[serde(default)]
    pub is_default: bool,
}

/// Pick the preset flagged as default, if any.
#[must_use]
pub fn default_prompt(prompts: &[SystemPrompt]) -> Option<&SystemPrompt> {
    prompts.iter().find(|p| p.is_default)
}

/// Payload for creating a system-prompt preset
#[derive(Clone, Debug, Serialize)]
pub struct NewSystemPrompt {
    /// Display name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The prompt text
    pub content: String,
    /// Whether to flag this preset as the default
    pub is_default: bool,
}

/// Partial update for a system-prompt preset
#[derive(Clone, Debug, Default, Serialize)]
pub struct SystemPromptUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New prompt text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// New default flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// One chat exchange request
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    /// Conversation the exchange belongs to
    pub conversation_id: i64,
    /// The user's message
    pub prompt: String,
    /// System prompt override; the backend applies its default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Id of the preset the override came from, for backend bookkeeping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<i64>,
}

impl ChatRequest {
    /// Create a request with just the conversation and prompt.
    pub fn new(conversation_id: i64, prompt: impl Into<String>) -> Self {
        Self {
            conversation_id,
            prompt: prompt.into(),
            system: None,
            prompt_id: None,
        }
    }

    /// Set a system prompt override.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Record the preset id the system override came from.
    #[must_use]
    pub fn with_prompt_id(mut self, prompt_id: i64) -> Self {
        self.prompt_id = Some(prompt_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_role_wire_format() {
        let msg: Message = serde_json::from_str(
            r#"{"id": 7, "role": "assistant", "content": "hola", "created_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.id, 7);
        assert!(!msg.is_optimistic());
    }

    #[test]
    fn test_message_ignores_extra_fields() {
        // The list endpoint also reports conversation_id and user_id.
        let msg: Message = serde_json::from_str(
            r#"{"id": 1, "conversation_id": 42, "user_id": 3, "role": "user",
                "content": "hi", "created_at": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn test_optimistic_message() {
        let msg = Message::optimistic("hola");
        assert_eq!(msg.id, OPTIMISTIC_MESSAGE_ID);
        assert_eq!(msg.role, MessageRole::User);
        assert!(msg.is_optimistic());
    }

    #[test]
    fn test_login_outcome_signed_in() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"needs_2fa": false, "access_token": "a", "refresh_token": "r"}"#,
        )
        .unwrap();
        let outcome = LoginOutcome::from_response(response).unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::SignedIn(TokenPair {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
            })
        );
    }

    #[test]
    fn test_login_outcome_needs_second_factor() {
        let response: LoginResponse =
            serde_json::from_str(r#"{"needs_2fa": true, "session_token": "s"}"#).unwrap();
        let outcome = LoginOutcome::from_response(response).unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::NeedsSecondFactor {
                session_token: "s".to_string()
            }
        );
    }

    #[test]
    fn test_login_outcome_malformed() {
        let response: LoginResponse = serde_json::from_str(r#"{"needs_2fa": true}"#).unwrap();
        assert!(matches!(
            LoginOutcome::from_response(response),
            Err(ClientError::UnexpectedResponse(_))
        ));

        let response: LoginResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            LoginOutcome::from_response(response),
            Err(ClientError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest::new(42, "hola");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"conversation_id": 42, "prompt": "hola"})
        );

        let request = ChatRequest::new(42, "hola")
            .with_system("Eres un asistente útil.")
            .with_prompt_id(3);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "Eres un asistente útil.");
        assert_eq!(json["prompt_id"], 3);
    }

    #[test]
    fn test_default_prompt() {
        let prompts = vec![
            SystemPrompt {
                id: 1,
                name: "plain".to_string(),
                description: None,
                content: "x".to_string(),
                is_default: false,
            },
            SystemPrompt {
                id: 2,
                name: "clinical".to_string(),
                description: Some("for triage".to_string()),
                content: "y".to_string(),
                is_default: true,
            },
        ];
        assert_eq!(default_prompt(&prompts).map(|p| p.id), Some(2));
        assert_eq!(default_prompt(&prompts[..1]), None);
    }

    #[test]
    fn test_is_admin() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id": 1, "email": "a@b.c", "role": "admin", "active": true}"#,
        )
        .unwrap();
        assert!(user.is_admin());
        assert!(user.created_at.is_none());
    }
}
