//! HTTP routes for the relay service.
//!
//! - `POST /callback` — LINE webhook (signature-verified)
//! - `POST /api/chat` — direct chat, bypassing the LINE platform
//! - `GET /health` — health check
//! - `GET /` — service descriptor

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::handler::MessageHandler;
use crate::line;
use crate::message::WebhookPayload;
use crate::notebook::NotebookClient;

const SERVICE_NAME: &str = "line-notebook-relay";

/// Shared state for the relay HTTP server.
pub struct AppState {
    /// LINE channel secret for webhook signature verification
    pub channel_secret: String,
    /// Notebook API client
    pub notebook: Arc<NotebookClient>,
    /// Inbound message handler
    pub handler: Arc<MessageHandler>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    notebook_api: String,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        notebook_api: state.notebook.base_url().to_string(),
    })
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "endpoints": {
            "webhook": "/callback",
            "health": "/health",
            "chat": "/api/chat"
        }
    }))
}

/// LINE webhook endpoint.
///
/// Verifies the `X-Line-Signature` header against the raw body, then
/// dispatches each text message event. Each event is handled inside its
/// own failure boundary: the handler absorbs its errors, so one bad event
/// cannot suppress replies to siblings in the same delivery.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(signature) = headers.get("x-line-signature").and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Webhook request without signature header");
        return (StatusCode::BAD_REQUEST, "Missing signature");
    };

    if !line::verify_signature(&state.channel_secret, &body, signature) {
        tracing::warn!("Webhook signature verification failed");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook payload unparsable");
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    for event in &payload.events {
        let Some(text_event) = event.as_text_message() else {
            tracing::debug!(event_type = %event.event_type, "Skipping non-text event");
            continue;
        };
        state.handler.handle_text_message(text_event).await;
    }

    (StatusCode::OK, "OK")
}

/// Direct chat endpoint, bypassing the LINE platform.
///
/// Body: `{text, conversation_id, notebook_id}`, all required. Returns the
/// raw Notebook API result, or `{error}` on missing fields or orchestration
/// failure. No network call is made when validation fails.
async fn api_chat(State(state): State<Arc<AppState>>, Json(data): Json<Value>) -> impl IntoResponse {
    let field = |name: &str| {
        data.get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    };

    let (Some(text), Some(conversation_id), Some(notebook_id)) =
        (field("text"), field("conversation_id"), field("notebook_id"))
    else {
        return Json(json!({
            "error": "Missing required fields: text, conversation_id, notebook_id"
        }));
    };

    match state.notebook.chat(conversation_id, Some(notebook_id), text).await {
        Ok(result) => Json(result),
        Err(e) => {
            tracing::error!(conversation_id = %conversation_id, error = %e, "Direct chat failed");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

/// Build the relay HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/callback", post(callback))
        .route("/api/chat", post(api_chat))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{ChannelError, ReplyChannel};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use relay_common::config::NotebookConfig;
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingChannel {
        replies: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ReplyChannel for RecordingChannel {
        async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
            self.replies
                .lock()
                .await
                .push((reply_token.to_string(), text.to_string()));
            Ok(())
        }
    }

    const SECRET: &str = "test-channel-secret";

    fn test_state(notebook_api: &str) -> (Arc<AppState>, Arc<RecordingChannel>) {
        let notebook = Arc::new(NotebookClient::new(&NotebookConfig {
            api_url: notebook_api.to_string(),
            notebook_id: Some("NB1".into()),
            model_id: None,
            insecure_tls: false,
        }));
        let channel = Arc::new(RecordingChannel::default());
        let handler = Arc::new(MessageHandler::new(notebook.clone(), channel.clone()));
        let state = Arc::new(AppState {
            channel_secret: SECRET.into(),
            notebook,
            handler,
        });
        (state, channel)
    }

    fn signed_callback(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/callback")
            .header("content-type", "application/json")
            .header("x-line-signature", line::sign_body(SECRET, body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_the_backend_url() {
        let (state, _) = test_state("http://notebook.local:8900");
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "line-notebook-relay");
        assert_eq!(body["notebook_api"], "http://notebook.local:8900");
    }

    #[tokio::test]
    async fn root_lists_the_endpoints() {
        let (state, _) = test_state("http://notebook.local:8900");
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["endpoints"]["webhook"], "/callback");
    }

    #[tokio::test]
    async fn callback_without_signature_is_rejected() {
        let (state, channel) = test_state("http://127.0.0.1:1");
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/callback")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"events":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(channel.replies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn callback_with_invalid_signature_is_rejected() {
        let (state, channel) = test_state("http://127.0.0.1:1");
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/callback")
                    .header("content-type", "application/json")
                    .header("x-line-signature", line::sign_body("wrong-secret", b"{}"))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(channel.replies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn callback_acknowledges_deliveries_without_text_events() {
        let (state, channel) = test_state("http://127.0.0.1:1");
        let app = build_router(state);

        let body = serde_json::json!({
            "events": [{ "type": "follow", "source": { "type": "user", "userId": "U1" } }]
        })
        .to_string();

        let response = app.oneshot(signed_callback(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(channel.replies.lock().await.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_text_message_relays_the_assistant_reply() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat/sessions"))
            .and(body_partial_json(serde_json::json!({
                "notebook_id": "NB1",
                "title": "Chat - U123"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "sess-9" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "context": { "sources": [], "notes": [] }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/execute"))
            .and(body_partial_json(serde_json::json!({
                "session_id": "sess-9",
                "message": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session_id": "sess-9",
                "messages": [
                    { "type": "human", "content": "hello" },
                    { "type": "ai", "content": "hi U123!" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (state, channel) = test_state(&server.uri());
        let app = build_router(state);

        let body = serde_json::json!({
            "events": [{
                "type": "message",
                "replyToken": "rt-7",
                "timestamp": 1700000000000i64,
                "source": { "type": "user", "userId": "U123" },
                "message": { "id": "m1", "type": "text", "text": "hello" }
            }]
        })
        .to_string();

        let response = app.oneshot(signed_callback(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let replies = channel.replies.lock().await;
        assert_eq!(replies.as_slice(), &[("rt-7".to_string(), "hi U123!".to_string())]);
    }

    #[tokio::test]
    async fn one_failing_event_does_not_suppress_sibling_replies() {
        let server = MockServer::start().await;

        // Session creation fails so every chat turn fails, but each event
        // still gets its own apology reply.
        Mock::given(method("POST"))
            .and(path("/api/chat/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "detail": "no" })),
            )
            .mount(&server)
            .await;

        let (state, channel) = test_state(&server.uri());
        let app = build_router(state);

        let body = serde_json::json!({
            "events": [
                {
                    "type": "message",
                    "replyToken": "rt-1",
                    "source": { "type": "user", "userId": "U1" },
                    "message": { "id": "m1", "type": "text", "text": "first" }
                },
                {
                    "type": "message",
                    "replyToken": "rt-2",
                    "source": { "type": "user", "userId": "U2" },
                    "message": { "id": "m2", "type": "text", "text": "second" }
                }
            ]
        })
        .to_string();

        let response = app.oneshot(signed_callback(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let replies = channel.replies.lock().await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].0, "rt-1");
        assert_eq!(replies[1].0, "rt-2");
    }

    #[tokio::test]
    async fn api_chat_rejects_missing_fields_without_network_calls() {
        let server = MockServer::start().await;
        // Any backend call would fail verification
        Mock::given(method("POST"))
            .and(path("/api/chat/sessions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (state, _) = test_state(&server.uri());
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"text":"hello","conversation_id":"U123"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            "Missing required fields: text, conversation_id, notebook_id"
        );
    }

    #[tokio::test]
    async fn api_chat_returns_the_raw_backend_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat/sessions"))
            .and(body_partial_json(serde_json::json!({ "notebook_id": "NB2" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "sess-1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "context": { "sources": [], "notes": [] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "session_id": "sess-1",
                "messages": [{ "type": "ai", "content": "direct answer" }]
            })))
            .mount(&server)
            .await;

        let (state, _) = test_state(&server.uri());
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"text":"hello","conversation_id":"U123","notebook_id":"NB2"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], "sess-1");
        assert_eq!(body["messages"][0]["content"], "direct answer");
    }

    #[tokio::test]
    async fn api_chat_converts_orchestration_errors_to_an_error_body() {
        let (state, _) = test_state("http://127.0.0.1:1");
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"text":"hello","conversation_id":"U123","notebook_id":"NB1"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Notebook API call failed"));
    }
}
