//! Client Error Taxonomy
//!
//! Typed errors for every way a backend interaction can fail. The mapping
//! from HTTP status codes follows the backend's conventions:
//!
//! - 401 anywhere means the session is gone; the transport expires the
//!   session handle and callers see [`ClientError::Unauthorized`].
//! - Other 4xx responses carry a `detail` message meant to be surfaced
//!   inline next to the offending input.
//! - 5xx responses are generic server failures.
//!
//! The chat endpoint has its own failure shapes: a non-success status before
//! any body is read ([`ClientError::ChatStatus`]) and a transport failure
//! mid-body ([`ClientError::Stream`]). Neither is retried automatically.

use thiserror::Error;

/// Errors produced by the Charla client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered 401; the local session has been torn down.
    #[error("authentication required")]
    Unauthorized,

    /// The backend rejected the request (4xx other than 401).
    #[error("request rejected ({status}): {detail}")]
    Validation {
        /// HTTP status code of the response
        status: u16,
        /// Detail message from the response body, or a generic fallback
        detail: String,
    },

    /// The backend failed (5xx).
    #[error("server error ({status}): {detail}")]
    Server {
        /// HTTP status code of the response
        status: u16,
        /// Detail message from the response body, or a generic fallback
        detail: String,
    },

    /// The chat endpoint refused the exchange before any fragment was read.
    #[error("chat request failed with status {status}")]
    ChatStatus {
        /// HTTP status code of the chat response
        status: u16,
    },

    /// The response body failed mid-stream (network or decode failure).
    #[error("stream failed: {message}")]
    Stream {
        /// Description of the failure
        message: String,
    },

    /// The stream was cancelled through its abort handle.
    #[error("stream aborted")]
    Aborted,

    /// A send was attempted with an empty prompt.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// A send was attempted while another one is still in flight.
    #[error("a send is already pending for this conversation")]
    SendPending,

    /// The backend answered with a shape the client does not understand.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    /// Connection-level HTTP failure (DNS, TLS, connect timeout, ...).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The response body was not the JSON the endpoint promised.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Classify a non-2xx HTTP status into the error taxonomy.
    ///
    /// `detail` is the message extracted from the response body when the
    /// backend provided one; otherwise a generic message naming the status
    /// code is used.
    #[must_use]
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let detail = detail.unwrap_or_else(|| format!("request failed with status {status}"));
        match status {
            401 => Self::Unauthorized,
            400..=499 => Self::Validation { status, detail },
            _ => Self::Server { status, detail },
        }
    }

    /// Whether this error means the session is no longer valid.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// The HTTP status behind this error, when there is one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Validation { status, .. }
            | Self::Server { status, .. }
            | Self::ChatStatus { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            ClientError::from_status(401, None),
            ClientError::Unauthorized
        ));
        assert!(matches!(
            ClientError::from_status(422, Some("bad email".to_string())),
            ClientError::Validation { status: 422, .. }
        ));
        assert!(matches!(
            ClientError::from_status(500, None),
            ClientError::Server { status: 500, .. }
        ));
    }

    #[test]
    fn test_from_status_detail_fallback() {
        let err = ClientError::from_status(503, None);
        assert_eq!(
            err.to_string(),
            "server error (503): request failed with status 503"
        );

        let err = ClientError::from_status(400, Some("title is required".to_string()));
        assert_eq!(err.to_string(), "request rejected (400): title is required");
    }

    #[test]
    fn test_is_auth() {
        assert!(ClientError::from_status(401, None).is_auth());
        assert!(!ClientError::from_status(403, None).is_auth());
        assert!(!ClientError::Aborted.is_auth());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(ClientError::Unauthorized.status(), Some(401));
        assert_eq!(ClientError::ChatStatus { status: 500 }.status(), Some(500));
        assert_eq!(ClientError::EmptyPrompt.status(), None);
    }
}
