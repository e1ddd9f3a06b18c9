//! Inbound message handling.
//!
//! Bridges a parsed LINE text message to the notebook client and sends
//! exactly one reply per event. Failures never escape: every failure mode
//! turns into an apology reply so the user's message is never dropped
//! silently.

use crate::line::ReplyChannel;
use crate::message::TextMessageEvent;
use crate::notebook::NotebookClient;
use serde_json::Value;
use std::sync::Arc;

/// Handler wiring the notebook client to a reply channel.
pub struct MessageHandler {
    notebook: Arc<NotebookClient>,
    channel: Arc<dyn ReplyChannel>,
}

impl MessageHandler {
    pub fn new(notebook: Arc<NotebookClient>, channel: Arc<dyn ReplyChannel>) -> Self {
        Self { notebook, channel }
    }

    /// Handle one inbound text message.
    ///
    /// Sends exactly one reply: the most recent assistant message on
    /// success, the apology template on any failure. Reply delivery
    /// failures are logged, not retried.
    pub async fn handle_text_message(&self, event: TextMessageEvent) {
        tracing::info!(
            user_id = %event.user_id,
            timestamp = event.timestamp,
            chars = event.text.chars().count(),
            "Received text message"
        );

        let reply_text = match self.notebook.chat(&event.user_id, None, &event.text).await {
            Ok(result) => {
                if let Some(error) = result.get("error").and_then(Value::as_str) {
                    tracing::error!(user_id = %event.user_id, error = %error, "Backend reported an error");
                    apology(error)
                } else if let Some(text) = latest_ai_message(&result) {
                    text
                } else {
                    tracing::warn!(user_id = %event.user_id, "Backend returned no assistant message");
                    apology("no assistant reply in the backend response")
                }
            }
            Err(e) => {
                tracing::error!(user_id = %event.user_id, error = %e, "Chat turn failed");
                apology(&e.to_string())
            }
        };

        if let Err(e) = self.channel.reply(&event.reply_token, &reply_text).await {
            tracing::error!(user_id = %event.user_id, error = %e, "Failed to send reply");
        }
    }
}

/// Most recent `ai`-tagged message content, scanning newest to oldest.
fn latest_ai_message(result: &Value) -> Option<String> {
    result
        .get("messages")?
        .as_array()?
        .iter()
        .rev()
        .find(|m| m.get("type").and_then(Value::as_str) == Some("ai"))
        .and_then(|m| m.get("content").and_then(Value::as_str))
        .map(str::to_string)
}

/// User-facing failure reply embedding the error text.
fn apology(detail: &str) -> String {
    format!("Sorry, something went wrong while handling your message: {detail}")
}
