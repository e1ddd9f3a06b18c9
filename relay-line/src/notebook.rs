//! Notebook API bridge.
//!
//! Orchestrates one chat turn against the remote Notebook API:
//!
//! 1. Resolve the notebook backing the conversation
//! 2. Ensure a chat session exists (cached per conversation)
//! 3. Fetch the notebook context (sources and notes)
//! 4. Execute the turn and return the raw result
//!
//! Context is refetched on every turn because sources can change between
//! turns; the cost is one extra round-trip.

use crate::session::SessionCache;
use relay_common::config::NotebookConfig;
use serde_json::{json, Value};
use std::time::Duration;

/// Every Notebook API call is bounded by this timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Notebook orchestration error type.
#[derive(Debug, thiserror::Error)]
pub enum NotebookError {
    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    #[error("Notebook creation failed: {0}")]
    NotebookCreation(String),

    #[error("Notebook API call failed: {0}")]
    Remote(String),
}

impl From<reqwest::Error> for NotebookError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

/// Client for the Notebook API.
///
/// Holds one long-lived HTTP connection pool and the per-conversation
/// session cache.
pub struct NotebookClient {
    client: reqwest::Client,
    base_url: String,
    default_notebook_id: Option<String>,
    model_id: Option<String>,
    sessions: SessionCache,
}

impl NotebookClient {
    /// Create a new client from the notebook backend configuration.
    pub fn new(config: &NotebookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            default_notebook_id: config.notebook_id.clone(),
            model_id: config.model_id.clone(),
            sessions: SessionCache::new(),
        }
    }

    /// Base URL of the backend (for the health endpoint).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Session cache, exposed for inspection.
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Run one chat turn for a conversation.
    ///
    /// `notebook_id` overrides the configured notebook for this call; when
    /// neither is present, a notebook is created lazily once per
    /// conversation. The returned value is the raw execute response.
    pub async fn chat(
        &self,
        conversation_id: &str,
        notebook_id: Option<&str>,
        message: &str,
    ) -> Result<Value, NotebookError> {
        let notebook_id = self.resolve_notebook(conversation_id, notebook_id).await?;
        let session_id = self.ensure_session(conversation_id, &notebook_id).await?;
        let context = self.fetch_context(&notebook_id).await;
        let result = self.execute(&session_id, message, context).await?;

        // The backend may rotate the session; keep the cache current.
        if let Some(sid) = result.get("session_id").and_then(Value::as_str) {
            if sid != session_id {
                tracing::info!(
                    conversation_id = %conversation_id,
                    old = %session_id,
                    new = %sid,
                    "Backend returned a new session id"
                );
            }
            self.sessions.set(conversation_id, sid);
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %session_id,
            "Chat turn completed"
        );
        Ok(result)
    }

    /// Resolve the notebook id for a conversation.
    ///
    /// Priority: explicit per-call id, then the configured default, then a
    /// notebook created lazily once per conversation.
    async fn resolve_notebook(
        &self,
        conversation_id: &str,
        explicit: Option<&str>,
    ) -> Result<String, NotebookError> {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(id) = &self.default_notebook_id {
            return Ok(id.clone());
        }
        if let Some(id) = self.sessions.notebook(conversation_id) {
            return Ok(id);
        }

        let lock = self.sessions.creation_lock(conversation_id);
        let _guard = lock.lock().await;

        // A concurrent first message may have created it while we waited.
        if let Some(id) = self.sessions.notebook(conversation_id) {
            return Ok(id);
        }

        let notebook_id = self.create_notebook(conversation_id).await?;
        self.sessions.set_notebook(conversation_id, &notebook_id);
        tracing::info!(
            conversation_id = %conversation_id,
            notebook_id = %notebook_id,
            "Created notebook for conversation"
        );
        Ok(notebook_id)
    }

    /// Return the cached session for a conversation, creating one on miss.
    ///
    /// The lookup-or-create sequence is serialized per conversation so two
    /// concurrent first messages cannot create duplicate sessions.
    async fn ensure_session(
        &self,
        conversation_id: &str,
        notebook_id: &str,
    ) -> Result<String, NotebookError> {
        if let Some(id) = self.sessions.get(conversation_id) {
            tracing::debug!(
                conversation_id = %conversation_id,
                session_id = %id,
                "Reusing cached session"
            );
            return Ok(id);
        }

        let lock = self.sessions.creation_lock(conversation_id);
        let _guard = lock.lock().await;

        if let Some(id) = self.sessions.get(conversation_id) {
            return Ok(id);
        }

        let session_id = self.create_session(notebook_id, conversation_id).await?;
        self.sessions.set(conversation_id, &session_id);
        tracing::info!(
            conversation_id = %conversation_id,
            session_id = %session_id,
            notebook_id = %notebook_id,
            "Created session for conversation"
        );
        Ok(session_id)
    }

    async fn create_notebook(&self, conversation_id: &str) -> Result<String, NotebookError> {
        let resp = self
            .client
            .post(format!("{}/api/notebooks", self.base_url))
            .json(&json!({
                "name": format!("LINE Bot - {conversation_id}"),
                "description": "LINE conversation notebook"
            }))
            .send()
            .await?;

        let data: Value = resp.json().await?;
        data.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NotebookError::NotebookCreation(format!("response missing id: {data}")))
    }

    async fn create_session(
        &self,
        notebook_id: &str,
        conversation_id: &str,
    ) -> Result<String, NotebookError> {
        let resp = self
            .client
            .post(format!("{}/api/chat/sessions", self.base_url))
            .json(&json!({
                "notebook_id": notebook_id,
                "title": format!("Chat - {conversation_id}")
            }))
            .send()
            .await?;

        let data: Value = resp.json().await?;
        data.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NotebookError::SessionCreation(format!("response missing id: {data}")))
    }

    /// Fetch the notebook context (sources and notes) for this turn.
    ///
    /// Never fails the turn: any call failure or shape mismatch degrades to
    /// the empty context.
    async fn fetch_context(&self, notebook_id: &str) -> Value {
        let empty = || json!({ "sources": [], "notes": [] });

        let resp = match self
            .client
            .post(format!("{}/api/chat/context", self.base_url))
            .json(&json!({ "notebook_id": notebook_id, "context_config": {} }))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "Context fetch failed, continuing with empty context");
                return empty();
            }
        };

        let data: Value = match resp.json().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Context response unreadable, continuing with empty context");
                return empty();
            }
        };

        match data.get("context") {
            Some(context) if context.is_object() => {
                tracing::debug!(
                    sources = context.get("sources").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
                    notes = context.get("notes").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
                    "Fetched notebook context"
                );
                context.clone()
            }
            _ => empty(),
        }
    }

    async fn execute(
        &self,
        session_id: &str,
        message: &str,
        context: Value,
    ) -> Result<Value, NotebookError> {
        let mut payload = json!({
            "session_id": session_id,
            "message": message,
            "context": context
        });
        if let Some(model) = &self.model_id {
            payload["model_override"] = json!(model);
            tracing::debug!(model = %model, "Using model override");
        }

        let resp = self
            .client
            .post(format!("{}/api/chat/execute", self.base_url))
            .json(&payload)
            .send()
            .await?;

        Ok(resp.json().await?)
    }
}
