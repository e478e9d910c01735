//! Telegram Bot API client
//!
//! Implements [`MessageTransport`] over `sendMessage` and exposes
//! `getUpdates` long polling for the command layer. Failed calls are mapped
//! onto [`TransportError`] variants so the delivery ladder can react to
//! rate limits, markup rejection and blocked chats.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bot::UpdateSource;
use crate::config::TelegramConfig;
use crate::delivery::{MessageTransport, TransportError};

static RETRY_AFTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"retry after (\d+)").expect("retry-after pattern is valid"));

/// Envelope shared by every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    #[serde(default)]
    description: String,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// One incoming update
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Telegram Bot API client
pub struct TelegramClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// Create a new client from configuration
    ///
    /// Reads the bot token from the environment variable named in config.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, TransportError> {
        debug!(base_url = %config.base_url, "TelegramClient::from_config: called");
        let token = config
            .get_token()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(TransportError::Network)?;
        Ok(Self::new(http, &config.base_url, token))
    }

    pub fn new(http: Client, base_url: &str, token: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Invoke a Bot API method with a JSON body
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TransportError> {
        debug!(%method, "call: called");
        // The URL embeds the token, so it is never logged
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let mut request = self.http.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(TransportError::InvalidResponse(format!("{method}: {e}")));
            }
            Err(_) => {
                return Err(TransportError::Api {
                    status: status.as_u16(),
                    message: text,
                });
            }
        };

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| TransportError::InvalidResponse(format!("{method}: missing result")));
        }

        let code = envelope.error_code.unwrap_or(status.as_u16());
        let retry_after = envelope.parameters.and_then(|p| p.retry_after);
        debug!(%method, code, description = %envelope.description, "call: api error");
        Err(classify_api_error(code, &envelope.description, retry_after))
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        debug!(?offset, timeout_secs, "get_updates: called");
        let mut body = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = serde_json::json!(offset);
        }
        // The HTTP timeout has to outlast the server-side long poll
        let request_timeout = Duration::from_secs(timeout_secs + 10);
        self.call("getUpdates", &body, Some(request_timeout)).await
    }
}

#[async_trait]
impl MessageTransport for TelegramClient {
    async fn send_raw(&self, chat_id: i64, text: &str, formatted: bool) -> Result<(), TransportError> {
        debug!(chat_id, formatted, "send_raw: called");
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if formatted {
            body["parse_mode"] = serde_json::json!("Markdown");
        }
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        self.get_updates(offset, timeout_secs).await
    }
}

/// Map a Bot API failure onto a transport error
pub fn classify_api_error(code: u16, description: &str, retry_after: Option<u64>) -> TransportError {
    let lower = description.to_lowercase();

    let wait = retry_after.filter(|secs| *secs > 0).or_else(|| parse_retry_after(&lower));
    if let Some(secs) = wait {
        return TransportError::RateLimited {
            retry_after: Duration::from_secs(secs),
        };
    }
    if lower.contains("can't parse entities") {
        return TransportError::FormattingRejected(description.to_string());
    }
    if lower.contains("chat not found") || lower.contains("bot was blocked by the user") {
        return TransportError::Unreachable(description.to_string());
    }
    TransportError::Api {
        status: code,
        message: description.to_string(),
    }
}

/// Extract a positive `retry after N` seconds hint from an error description
fn parse_retry_after(lower: &str) -> Option<u64> {
    let caps = RETRY_AFTER_RE.captures(lower)?;
    let secs: u64 = caps.get(1)?.as_str().parse().ok()?;
    (secs > 0).then_some(secs)
}
