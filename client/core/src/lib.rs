//! Charla Client Core - Headless Chat Client for the Charla Backend
//!
//! This crate is the client-side core of a chat application whose business
//! logic (authentication, persistence, LLM invocation) lives in a backend
//! service reached over HTTP. It is completely independent of any UI
//! framework: a terminal front end, a GUI, or a test harness drives it the
//! same way.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         UI Surface                           │
//! │          (terminal, GUI, headless test harness)              │
//! └──────────────┬────────────────────────────┬──────────────────┘
//!                │ drives                     │ observes SessionEvent
//! ┌──────────────▼────────────────────────────┴──────────────────┐
//! │                        ChatClient                            │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │  Session   │  │   Message    │  │     ChatSession      │  │
//! │  │   Handle   │  │    Cache     │  │  (one conversation)  │  │
//! │  └────────────┘  └──────────────┘  └──────────┬───────────┘  │
//! └───────────────────────────────────────────────┼──────────────┘
//!                                 ┌───────────────▼──────────────┐
//!                                 │   ChatBackend (ApiClient)    │
//!                                 │   Transport ── ChatStream    │
//!                                 └───────────────┬──────────────┘
//!                                                 │ HTTPS + session cookie
//!                                                 ▼
//!                                          backend REST API
//! ```
//!
//! # The exchange cycle
//!
//! One [`chat::ChatSession::send`] call is: guard check → optimistic insert
//! of the user message → streaming chat request → fragments delivered in
//! order to the caller → cache reconciliation (on success and failure
//! alike). The response body is consumed as a lazy async sequence of UTF-8
//! fragments; a multi-byte character split across two reads is carried over
//! by the decoder, and an abort handle provides cooperative cancellation
//! between reads.
//!
//! # Sessions
//!
//! The auth state is a three-position machine (`Unknown`,
//! `Authenticated`, `Unauthenticated`) behind an explicitly injected
//! [`session::SessionHandle`]. Any 401 from any endpoint tears the session
//! down exactly once: caches are cleared, an `Expired` event is emitted, and
//! the UI returns to its login screen. Logout clears local state before
//! notifying the backend and is never blockable by a network failure.
//!
//! # Module Overview
//!
//! - [`api`]: the `ChatBackend` trait seam and the reqwest-backed client
//! - [`cache`]: per-conversation message cache with optimistic entries
//! - [`chat`]: the client facade and per-conversation exchange driver
//! - [`config`]: TOML + environment configuration
//! - [`error`]: the error taxonomy
//! - [`models`]: domain and wire types
//! - [`session`]: auth state machine and teardown
//! - [`stream`]: the streaming response decoder
//! - [`transport`]: the HTTP/JSON layer
//!
//! # No UI Dependencies
//!
//! This crate renders nothing and has **zero** dependencies on any UI
//! framework. It is pure client logic that can be driven from anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

// Re-exports for convenience
pub use api::{ApiClient, ChatBackend};
pub use cache::{MessageCache, DEFAULT_MESSAGE_LIMIT};
pub use chat::{ChatClient, ChatSession, ExchangeId, PendingFlag};
pub use config::{default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError};
pub use error::ClientError;
pub use models::{
    default_prompt, AuthUser, ChatRequest, Conversation, LoginOutcome, LoginResponse, Message,
    MessageRole, NewSystemPrompt, SystemPrompt, SystemPromptUpdate, TokenPair, TwoFactorSetup,
    OPTIMISTIC_MESSAGE_ID,
};
pub use session::{AuthState, SessionEvent, SessionHandle};
pub use stream::{AbortHandle, ChatStream};
pub use transport::Transport;
