//! Outbound notifications. Telegram is the only sink the watcher ships with.

use async_trait::async_trait;
use serde::Serialize;

/// Telegram refuses `sendMessage` texts longer than this (in characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Joins one available-slot block to the next inside a message.
pub const MESSAGE_SEPARATOR: &str = "\n\n---\n\n";

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Somewhere a finished message can be sent.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one message. `formatted` turns on Markdown rendering.
    async fn deliver(&self, message: &str, formatted: bool) -> Result<(), DeliveryError>;
}

pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

impl TelegramSink {
    pub fn new(client: reqwest::Client, bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Point the sink at another Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn send_part(&self, text: &str, formatted: bool) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: formatted.then_some("Markdown"),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let resp_body: serde_json::Value = response.json().await?;

        if resp_body.get("ok") == Some(&serde_json::Value::Bool(true)) {
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(30);
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }

        let description = resp_body
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        Err(DeliveryError::Api(format!("{status}: {description}")))
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    /// Oversized messages go out as several parts. A failed part is logged and
    /// does not stop the others; the first error is returned.
    async fn deliver(&self, message: &str, formatted: bool) -> Result<(), DeliveryError> {
        let parts = split_message(message, TELEGRAM_MESSAGE_LIMIT);
        let total = parts.len();
        let mut first_err = None;
        for (i, part) in parts.iter().enumerate() {
            match self.send_part(part, formatted).await {
                Ok(()) => tracing::debug!(part = i + 1, total, "telegram message sent"),
                Err(e) => {
                    tracing::warn!(part = i + 1, total, "telegram delivery failed: {e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Split `message` into parts of at most `limit` characters.
///
/// Blocks joined by [`MESSAGE_SEPARATOR`] are kept whole and packed greedily.
/// A single block longer than the limit is cut on character boundaries.
pub fn split_message(message: &str, limit: usize) -> Vec<String> {
    if message.chars().count() <= limit {
        return vec![message.to_string()];
    }

    let sep_len = MESSAGE_SEPARATOR.chars().count();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for block in message.split(MESSAGE_SEPARATOR) {
        let block_len = block.chars().count();
        if current_len > 0 && current_len + sep_len + block_len <= limit {
            current.push_str(MESSAGE_SEPARATOR);
            current.push_str(block);
            current_len += sep_len + block_len;
            continue;
        }
        if current_len > 0 {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if block_len <= limit {
            current.push_str(block);
            current_len = block_len;
        } else {
            let chars: Vec<char> = block.chars().collect();
            for chunk in chars.chunks(limit) {
                parts.push(chunk.iter().collect());
            }
        }
    }
    if current_len > 0 {
        parts.push(current);
    }
    parts
}
