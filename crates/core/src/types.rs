use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Dm,
    Channel,
    Other,
}

impl ChannelKind {
    /// Map Slack's `channel_type` field (`im`, `channel`, `group`, `mpim`).
    pub fn from_slack(channel_type: &str) -> Self {
        match channel_type {
            "im" => ChannelKind::Dm,
            "channel" | "group" | "mpim" => ChannelKind::Channel,
            _ => ChannelKind::Other,
        }
    }
}

/// One inbound chat event, as parsed from a single webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub event_ts: String,
    pub author_id: String,
    pub text: String,
    pub channel_id: String,
    pub channel_kind: ChannelKind,
    /// Parent thread of the event, when it was posted inside a thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl InboundEvent {
    pub fn delivery_key(&self) -> DeliveryKey {
        DeliveryKey::new(&self.channel_id, &self.event_ts)
    }

    /// Where replies belong: the existing thread, or a new thread rooted at
    /// this event.
    pub fn reply_thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.event_ts)
    }
}

/// Identifies one logical delivery: `channel_id + event_ts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    pub fn new(channel_id: &str, event_ts: &str) -> Self {
        Self(format!("{}{}", channel_id, event_ts))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound unit posted to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage {
    pub channel_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl RelayMessage {
    pub fn new(channel_id: &str, text: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            thread_ts: None,
        }
    }

    /// Builder-style method to reply inside a thread
    pub fn in_thread(mut self, thread_ts: Option<&str>) -> Self {
        self.thread_ts = thread_ts.map(|ts| ts.to_string());
        self
    }
}

/// Returned by a successful post; required to edit that message later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayHandle {
    pub channel_id: String,
    pub message_ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message: HistoryMessage,
}

impl HistoryEntry {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            message: HistoryMessage {
                role,
                content: content.to_string(),
            },
        }
    }

    /// Assistant output worth relaying.
    pub fn assistant_content(&self) -> Option<&str> {
        let content = self.message.content.trim();
        (self.message.role == Role::Assistant && !content.is_empty()).then_some(content)
    }
}

/// Snapshot of the backend task queue, as reported by its state endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendState {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub queue_length: u32,
}

impl BackendState {
    /// Nothing running and nothing waiting.
    pub fn is_idle(&self) -> bool {
        !self.is_processing && self.queue_length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_key_concatenates_channel_and_timestamp() {
        assert_eq!(DeliveryKey::new("C1", "1700000000.0001").as_str(), "C11700000000.0001");
    }

    #[test]
    fn slack_channel_types_map_to_kinds() {
        assert_eq!(ChannelKind::from_slack("im"), ChannelKind::Dm);
        assert_eq!(ChannelKind::from_slack("channel"), ChannelKind::Channel);
        assert_eq!(ChannelKind::from_slack("mpim"), ChannelKind::Channel);
        assert_eq!(ChannelKind::from_slack("app_home"), ChannelKind::Other);
    }

    #[test]
    fn backend_state_parses_camel_case_and_unknown_roles() {
        let state: BackendState = serde_json::from_str(
            r#"{
                "history": [
                    {"message": {"role": "user", "content": "hi"}},
                    {"message": {"role": "function", "content": "x"}},
                    {"message": {"role": "assistant", "content": " 42 "}}
                ],
                "isProcessing": false,
                "queueLength": 0
            }"#,
        )
        .unwrap();
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[1].message.role, Role::Other);
        assert_eq!(state.history[2].assistant_content(), Some("42"));
        assert!(state.is_idle());
    }

    #[test]
    fn blank_assistant_content_is_not_relayable() {
        assert_eq!(HistoryEntry::new(Role::Assistant, "  ").assistant_content(), None);
        assert_eq!(HistoryEntry::new(Role::User, "hello").assistant_content(), None);
    }

    #[test]
    fn reply_thread_prefers_existing_thread() {
        let mut event = InboundEvent {
            kind: EventKind::Message,
            event_ts: "2.0".to_string(),
            author_id: "U1".to_string(),
            text: "hi".to_string(),
            channel_id: "C1".to_string(),
            channel_kind: ChannelKind::Channel,
            thread_ts: None,
        };
        assert_eq!(event.reply_thread(), "2.0");
        event.thread_ts = Some("1.0".to_string());
        assert_eq!(event.reply_thread(), "1.0");
    }
}
