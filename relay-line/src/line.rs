//! LINE messaging channel adapter.
//!
//! Verifies webhook signatures and sends replies through the LINE reply
//! API.
//!
//! ## API Documentation
//! - https://developers.line.biz/en/reference/messaging-api/#signature-validation
//! - https://developers.line.biz/en/reference/messaging-api/#send-reply-message

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::borrow::Cow;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const LINE_API_BASE: &str = "https://api.line.me";

/// LINE rejects text messages longer than 5000 characters.
const MAX_REPLY_CHARS: usize = 5000;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Verify the `X-Line-Signature` header against the raw request body.
///
/// LINE signs the body with HMAC-SHA256 keyed by the channel secret and
/// base64-encodes the digest. Comparison is constant-time.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature LINE would attach to `body`.
///
/// Used by tests and local tooling to craft valid webhook requests.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Clip reply text to the platform limit, on a character boundary.
fn clip_reply(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_REPLY_CHARS {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().take(MAX_REPLY_CHARS).collect())
    }
}

/// Outbound reply surface of a messaging platform.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Send one text reply for the given reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError>;
}

/// LINE messaging channel using the reply API.
pub struct LineChannel {
    access_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl LineChannel {
    /// Create a new LINE channel.
    pub fn new(access_token: String) -> Self {
        Self::with_api_base(access_token, LINE_API_BASE.to_string())
    }

    /// Create a channel against a non-default API base (for tests).
    pub fn with_api_base(access_token: String, api_base: String) -> Self {
        Self {
            access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        if reply_token.is_empty() {
            return Err(ChannelError::InvalidMessage("empty reply token".into()));
        }

        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": clip_reply(text) }]
        });

        let resp = self
            .client
            .post(format!("{}/v2/bot/message/reply", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("LINE reply error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "LINE reply failed with {status}: {detail}"
            )));
        }

        Ok(())
    }
}
