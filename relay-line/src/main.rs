//! LINE notebook relay - main entry point.

use anyhow::Result;
use relay_common::config::Config;
use relay_common::logging::init_logging;
use relay_line::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("LINE notebook relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        notebook_api = %config.notebook.api_url,
        notebook_id = %config
            .notebook
            .notebook_id
            .as_deref()
            .unwrap_or("(auto-create per conversation)"),
        "Notebook backend configured"
    );

    // Start the HTTP server
    start_server(&config).await
}
