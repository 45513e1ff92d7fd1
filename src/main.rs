//! proxypilot - headless control server
//!
//! Runs the proxy supervisor with a local REST control API.
//!
//! Environment variables:
//! - `PROXYPILOT_CONTROL_PORT` - Control API port (default: 8930)
//! - `PROXYPILOT_WEB_USER` - Basic auth username (default: "admin")
//! - `PROXYPILOT_WEB_PASS` - Basic auth password (auth disabled if not set)
//! - `PROXYPILOT_BIN_DIR` - Directory holding the bundled helper binary
//! - `PROXYPILOT_ASSETS_DIR` - Overrides for the bundled templates

use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = proxypilot::init_logging();

    info!("Starting proxypilot (control server mode)");

    if let Some(dir) = proxypilot::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let port: u16 = std::env::var("PROXYPILOT_CONTROL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8930);

    if std::env::var("PROXYPILOT_WEB_PASS").map(|p| !p.is_empty()).unwrap_or(false) {
        let user = std::env::var("PROXYPILOT_WEB_USER").unwrap_or_else(|_| "admin".to_string());
        info!("Basic auth enabled (user: {})", user);
    } else {
        info!("Basic auth disabled (set PROXYPILOT_WEB_PASS to enable)");
    }

    let state = Arc::new(proxypilot::AppState::new());

    info!("Control API: http://127.0.0.1:{}/api/status", port);

    // Blocks until ctrl-c.
    proxypilot::web::start_server(state.clone(), port).await?;

    // Single teardown point: stop the services and join the PAC listener
    // before the process exits.
    state.orchestrator.stop().await;
    info!("proxypilot stopped");

    Ok(())
}
