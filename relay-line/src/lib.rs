//! LINE → Notebook relay service.
//!
//! Receives LINE webhook events, forwards text messages to the Notebook
//! API conversational backend, and replies to the originating conversation
//! with the assistant's answer.
//!
//! ```text
//! LINE user → webhook → relay-line → Notebook API
//!      ↑                                  ↓
//!      └───── reply API ←──── assistant message
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod handler;
pub mod line;
pub mod message;
pub mod notebook;
pub mod routes;
pub mod session;

// Re-export commonly used types
pub use handler::MessageHandler;
pub use line::{sign_body, verify_signature, ChannelError, LineChannel, ReplyChannel};
pub use message::{TextMessageEvent, WebhookEvent, WebhookPayload};
pub use notebook::{NotebookClient, NotebookError};
pub use routes::{build_router, AppState};
pub use session::SessionCache;

use relay_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the relay router with CORS middleware from a loaded configuration.
pub fn build_relay_router(config: &Config) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let notebook = Arc::new(NotebookClient::new(&config.notebook));
    let channel = Arc::new(LineChannel::new(config.line.channel_access_token.clone()));
    let handler = Arc::new(MessageHandler::new(notebook.clone(), channel));

    let state = Arc::new(AppState {
        channel_secret: config.line.channel_secret.clone(),
        notebook,
        handler,
    });

    build_router(state).layer(cors)
}

/// Start the relay HTTP server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.bind.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let router = build_relay_router(config);

    tracing::info!("Starting LINE notebook relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
