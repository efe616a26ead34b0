use regex::Regex;
use slackrelay_core::types::{ChannelKind, EventKind, InboundEvent};

/// An event that passed routing, with the text to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub channel_id: String,
    pub user_id: String,
    /// Mention tokens stripped. May be empty.
    pub text: String,
    pub thread_ts: Option<String>,
    pub direct: bool,
}

/// Decides which events the bot answers, and what it was asked.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    bot_id: String,
    mention: Regex,
}

impl EventClassifier {
    pub fn new(bot_id: &str) -> Result<Self, regex::Error> {
        // `<@U123>` or the labelled form `<@U123|name>`.
        let mention = Regex::new(&format!(r"<@{}(?:\|[^>]*)?>", regex::escape(bot_id)))?;
        Ok(Self {
            bot_id: bot_id.to_string(),
            mention,
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// A message not written by the bot itself.
    pub fn is_processable(&self, event: &InboundEvent) -> bool {
        event.kind == EventKind::Message && event.author_id != self.bot_id
    }

    pub fn is_direct_message(&self, event: &InboundEvent) -> bool {
        event.channel_kind == ChannelKind::Dm
    }

    pub fn is_mentioned(&self, text: &str) -> bool {
        self.mention.is_match(text)
    }

    /// Strip every mention of the bot and trim.
    pub fn extract_text(&self, text: &str) -> String {
        self.mention.replace_all(text, "").trim().to_string()
    }

    /// DMs are always answered; channel messages only when they mention the
    /// bot. Channel replies go to the thread of the triggering message.
    pub fn route(&self, event: &InboundEvent) -> Option<Routed> {
        if !self.is_processable(event) {
            return None;
        }

        let direct = self.is_direct_message(event);
        if !direct && !self.is_mentioned(&event.text) {
            return None;
        }

        let thread_ts = if direct {
            event.thread_ts.clone()
        } else {
            Some(event.reply_thread().to_string())
        };

        Some(Routed {
            channel_id: event.channel_id.clone(),
            user_id: event.author_id.clone(),
            text: self.extract_text(&event.text),
            thread_ts,
            direct,
        })
    }
}
