use serde::Deserialize;
use slackrelay_core::types::{ChannelKind, EventKind, InboundEvent};

pub const URL_VERIFICATION: &str = "url_verification";
pub const EVENT_CALLBACK: &str = "event_callback";

/// Message subtypes that are edits, deletions or other bots talking.
const IGNORED_SUBTYPES: [&str; 4] = [
    "bot_message",
    "message_changed",
    "message_deleted",
    "channel_join",
];

/// Outer Events API body.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub event_ts: Option<String>,
    pub ts: Option<String>,
    pub user: Option<String>,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl SlackEvent {
    fn is_bot_traffic(&self) -> bool {
        self.bot_id.is_some()
            || self
                .subtype
                .as_deref()
                .is_some_and(|s| IGNORED_SUBTYPES.contains(&s))
    }

    pub fn into_inbound(self) -> InboundEvent {
        let kind = match self.kind.as_str() {
            "message" | "app_mention" if !self.is_bot_traffic() => EventKind::Message,
            _ => EventKind::Other,
        };
        let channel_kind = match (self.kind.as_str(), self.channel_type.as_deref()) {
            (_, Some(channel_type)) => ChannelKind::from_slack(channel_type),
            // app_mention only fires in conversations with several members.
            ("app_mention", None) => ChannelKind::Channel,
            _ => ChannelKind::Other,
        };

        InboundEvent {
            kind,
            event_ts: self.event_ts.or(self.ts).unwrap_or_default(),
            author_id: self.user.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            channel_id: self.channel.unwrap_or_default(),
            channel_kind,
            thread_ts: self.thread_ts,
        }
    }
}
