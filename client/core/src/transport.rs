//! HTTP Transport
//!
//! Thin wrapper over `reqwest` for the backend's JSON surface. All requests
//! ride the client's cookie store - the session cookie is set by the backend
//! and never read or constructed here.
//!
//! Non-2xx responses are normalized into [`ClientError`] via
//! [`ClientError::from_status`], with the `detail` message extracted from
//! the body when the backend provided one. A 204/205 response, or a 2xx with
//! an empty body, yields no content instead of a decode attempt.
//!
//! Any 401, from any endpoint, expires the injected [`SessionHandle`] - the
//! global teardown hook. The streaming chat endpoint bypasses JSON decoding
//! entirely ([`Transport::post_stream`]): the generic path assumes a single
//! complete JSON payload, which the chat response is not.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::SessionHandle;

/// HTTP transport to the backend API
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    session: SessionHandle,
}

impl Transport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] when the underlying client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig, session: SessionHandle) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            session,
        })
    }

    /// The configured base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET` a JSON payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP or decode failure.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let value = self.send_json(Method::GET, path, None::<&()>).await?;
        decode_required(value)
    }

    /// `POST` a JSON body and decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP or decode failure.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.send_json(Method::POST, path, Some(body)).await?;
        decode_required(value)
    }

    /// `POST` a JSON body, ignoring any response payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP failure.
    pub async fn post_unit<B>(&self, path: &str, body: Option<&B>) -> Result<(), ClientError>
    where
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, path, body).await?;
        Ok(())
    }

    /// `PUT` a JSON body and decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP or decode failure.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.send_json(Method::PUT, path, Some(body)).await?;
        decode_required(value)
    }

    /// `PATCH` a JSON body and decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP or decode failure.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.send_json(Method::PATCH, path, Some(body)).await?;
        decode_required(value)
    }

    /// `DELETE` a resource, ignoring any response payload.
    ///
    /// # Errors
    ///
    /// Normalized [`ClientError`] on HTTP failure.
    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send_json(Method::DELETE, path, None::<&()>).await?;
        Ok(())
    }

    /// `POST` to an endpoint whose response body is consumed incrementally.
    ///
    /// Only the status line is inspected here: 401 expires the session, any
    /// other non-success status becomes [`ClientError::ChatStatus`], and no
    /// body is read on failure. No overall timeout is applied - the stream
    /// may legitimately outlive any fixed request budget.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unauthorized`], [`ClientError::ChatStatus`] or
    /// [`ClientError::Http`].
    pub async fn post_stream<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let response = self.http.post(self.url(path)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.session.expire();
                return Err(ClientError::Unauthorized);
            }
            return Err(ClientError::ChatStatus {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn send_json<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<Value>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self
            .http
            .request(method.clone(), self.url(path))
            .timeout(self.request_timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ClientError::from_status(status.as_u16(), extract_detail(&body));
            if err.is_auth() {
                tracing::debug!(%method, path, "401 response, expiring session");
                self.session.expire();
            }
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return Ok(None);
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

/// Pull the backend's `detail` message out of an error body, when present.
fn extract_detail(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("detail")?
        .as_str()
        .map(ToOwned::to_owned)
}

/// Decode a payload that the endpoint contract says must be present.
fn decode_required<T: DeserializeOwned>(value: Option<Value>) -> Result<T, ClientError> {
    Ok(serde_json::from_value(value.unwrap_or(Value::Null))?)
}
