//! Configuration for the relay service.
//!
//! All settings come from environment variables, matching the deployment
//! surface of the service:
//!
//! - `PORT` → server.port (default 8902)
//! - `RELAY_BIND_ADDRESS` → server.bind (default "0.0.0.0")
//! - `ChannelSecret` → line.channel_secret (**required**)
//! - `ChannelAccessToken` → line.channel_access_token (**required**)
//! - `NOTEBOOK_API_URL` → notebook.api_url (default "https://localhost:8900")
//! - `NOTEBOOK_ID` → notebook.notebook_id (optional fixed notebook)
//! - `MODEL_ID` → notebook.model_id (optional model override)
//! - `NOTEBOOK_API_INSECURE` → notebook.insecure_tls (default false)
//! - `RELAY_LOG_LEVEL` → observability.log_level (default "info")
//! - `RELAY_LOG_FORMAT` → observability.log_format (default "pretty")

use anyhow::{bail, Context, Result};

/// Default port the relay listens on.
const DEFAULT_PORT: u16 = 8902;

/// Default Notebook API base URL.
const DEFAULT_NOTEBOOK_API_URL: &str = "https://localhost:8900";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// LINE platform credentials
    pub line: LineConfig,
    /// Notebook API backend settings
    pub notebook: NotebookConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address. Default "0.0.0.0" since the webhook must be reachable
    /// by the LINE platform.
    pub bind: String,
    /// Port number
    pub port: u16,
}

/// LINE platform credentials.
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Channel secret used to verify webhook signatures
    pub channel_secret: String,
    /// Channel access token used for the reply API
    pub channel_access_token: String,
}

/// Notebook API backend settings.
#[derive(Debug, Clone)]
pub struct NotebookConfig {
    /// Base URL of the Notebook API
    pub api_url: String,
    /// Fixed notebook id; when absent a notebook is created lazily per
    /// conversation
    pub notebook_id: Option<String>,
    /// Model override forwarded on execute calls
    pub model_id: Option<String>,
    /// Accept invalid TLS certificates (for self-signed local backends)
    pub insecure_tls: bool,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Output format: "json" or "pretty"
    pub log_format: String,
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// Fails when a required variable (`ChannelSecret`,
    /// `ChannelAccessToken`) is missing or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests supply their own lookup instead of
    /// mutating the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get_nonempty = |name: &str| get(name).filter(|v| !v.is_empty());

        let Some(channel_secret) = get_nonempty("ChannelSecret") else {
            bail!("ChannelSecret environment variable is not set");
        };
        let Some(channel_access_token) = get_nonempty("ChannelAccessToken") else {
            bail!("ChannelAccessToken environment variable is not set");
        };

        let port = match get_nonempty("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value: {raw}"))?,
            None => DEFAULT_PORT,
        };

        let insecure_tls = get_nonempty("NOTEBOOK_API_INSECURE")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            server: ServerConfig {
                bind: get_nonempty("RELAY_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".into()),
                port,
            },
            line: LineConfig {
                channel_secret,
                channel_access_token,
            },
            notebook: NotebookConfig {
                api_url: get_nonempty("NOTEBOOK_API_URL")
                    .unwrap_or_else(|| DEFAULT_NOTEBOOK_API_URL.into()),
                notebook_id: get_nonempty("NOTEBOOK_ID"),
                model_id: get_nonempty("MODEL_ID"),
                insecure_tls,
            },
            observability: ObservabilityConfig {
                log_level: get_nonempty("RELAY_LOG_LEVEL").unwrap_or_else(|| "info".into()),
                log_format: get_nonempty("RELAY_LOG_FORMAT").unwrap_or_else(|| "pretty".into()),
            },
        })
    }
}
