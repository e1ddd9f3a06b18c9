//! LINE webhook payload types.

use serde::Deserialize;

/// Top-level webhook delivery: an ordered batch of events.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Bot user id the delivery was addressed to
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// A single webhook event. Only `message` events with a text body are
/// relayed; everything else (follow, unfollow, stickers, ...) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    /// Event time in Unix millis
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Where the event came from (user, group, or room).
#[derive(Debug, Clone, Deserialize)]
pub struct EventSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// Message body attached to a `message` event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A fully-resolved inbound text message, ready for the handler.
#[derive(Debug, Clone)]
pub struct TextMessageEvent {
    pub reply_token: String,
    pub user_id: String,
    pub text: String,
    /// Event time in Unix millis
    pub timestamp: i64,
}

impl WebhookEvent {
    /// Resolve this event into a text message, if it is one.
    ///
    /// Returns `None` for non-message events, non-text messages, and events
    /// missing a reply token or a sender user id.
    pub fn as_text_message(&self) -> Option<TextMessageEvent> {
        if self.event_type != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.message_type != "text" {
            return None;
        }
        let text = message.text.clone()?;
        let reply_token = self.reply_token.clone()?;
        let user_id = self.source.as_ref()?.user_id.clone()?;

        Some(TextMessageEvent {
            reply_token,
            user_id,
            text,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        })
    }
}
