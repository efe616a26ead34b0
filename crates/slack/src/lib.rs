use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use slackrelay_core::config::SlackConfig;
use slackrelay_core::types::{RelayHandle, RelayMessage};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Slack rejects `text` longer than this.
pub const MAX_MESSAGE_CHARS: usize = 40_000;

/// Failure of an outbound chat call. Always returned as a value; callers
/// decide whether it ends their work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The platform answered but refused the call (`ok: false` or non-2xx).
    #[error("Slack API error: {0}")]
    Platform(String),
    #[error("Network error: {0}")]
    Transport(String),
}

impl RelayError {
    pub fn reason(&self) -> &str {
        match self {
            RelayError::Platform(reason) | RelayError::Transport(reason) => reason,
        }
    }
}

/// Outbound side of the chat platform: post, edit and whisper messages.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn post(&self, message: &RelayMessage) -> Result<RelayHandle, RelayError>;

    async fn update(&self, handle: &RelayHandle, text: &str) -> Result<(), RelayError>;

    /// Message visible only to `user_id`.
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), RelayError>;
}

/// Cut `text` to the platform limit on a char boundary.
pub fn truncate_for_slack(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}

#[derive(Clone)]
pub struct SlackClient {
    bot_token: String,
    api_base: String,
    client: Client,
}

impl SlackClient {
    /// Every call is bounded by `timeout`; a stalled request surfaces as
    /// [`RelayError::Transport`].
    pub fn new(
        bot_token: String,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        Ok(Self {
            bot_token,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, RelayError> {
        Self::new(
            config.bot_token.clone(),
            Some(config.api_base.clone()),
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )
    }

    /// Resolve the identity behind the bot token (`auth.test`). Returns the
    /// bot's user id.
    pub async fn auth_test(&self) -> Result<String, RelayError> {
        let resp = self.call("auth.test", &json!({})).await?;
        resp.get("user_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RelayError::Platform("missing_user_id".to_string()))
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<Value, RelayError> {
        let url = format!("{}/{}", self.api_base, method);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(method, error = %e, "Slack network error");
                RelayError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let parsed = serde_json::from_str::<Value>(&body).ok();
        let ok = parsed
            .as_ref()
            .and_then(|v| v.get("ok").and_then(|x| x.as_bool()))
            .unwrap_or(false);

        if status.is_success() && ok {
            debug!(method, "Slack call succeeded");
            // `ok` implies the body parsed.
            return Ok(parsed.unwrap_or(Value::Null));
        }

        let reason = parsed
            .as_ref()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()))
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!(method, %status, reason = %reason, "Slack call rejected");
        Err(RelayError::Platform(reason))
    }
}

#[async_trait]
impl RelayClient for SlackClient {
    async fn post(&self, message: &RelayMessage) -> Result<RelayHandle, RelayError> {
        let mut payload = json!({
            "channel": message.channel_id,
            "text": truncate_for_slack(&message.text),
        });
        if let Some(ts) = &message.thread_ts {
            payload["thread_ts"] = json!(ts);
        }

        let resp = self.call("chat.postMessage", &payload).await?;
        let message_ts = resp
            .get("ts")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RelayError::Platform("missing_ts".to_string()))?;
        let channel_id = resp
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or(&message.channel_id);

        Ok(RelayHandle {
            channel_id: channel_id.to_string(),
            message_ts: message_ts.to_string(),
        })
    }

    async fn update(&self, handle: &RelayHandle, text: &str) -> Result<(), RelayError> {
        let payload = json!({
            "channel": handle.channel_id,
            "ts": handle.message_ts,
            "text": truncate_for_slack(text),
        });
        self.call("chat.update", &payload).await.map(|_| ())
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), RelayError> {
        let payload = json!({
            "channel": channel_id,
            "user": user_id,
            "text": truncate_for_slack(text),
        });
        self.call("chat.postEphemeral", &payload).await.map(|_| ())
    }
}
