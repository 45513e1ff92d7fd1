//! HTTP route handlers for the control API.
//!
//! Thin handlers over [`crate::orchestrator::Orchestrator`] and the shared
//! configuration. Lifecycle errors map onto HTTP statuses: port conflicts
//! are 409, configuration problems 400, adapter failures 500.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::{info, warn};

use crate::orchestrator::OrchestratorError;
use crate::{AppConfig, AppState, ProxyMode};

/// JSON error response helper
fn err_response(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": msg })))
}

fn error_status(e: &OrchestratorError) -> StatusCode {
    match e {
        OrchestratorError::PortInUse { .. } => StatusCode::CONFLICT,
        OrchestratorError::NoServerSelected | OrchestratorError::Client(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::SystemProxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Lifecycle
        .route("/status", get(get_status))
        .route("/restart", post(restart))
        .route("/stop", post(stop))
        // Config
        .route("/config", get(get_config).post(set_config))
        .route("/mode", post(set_mode))
        // Diagnostics
        .route("/proxy/test", post(test_proxy))
        // Auth middleware (only if PROXYPILOT_WEB_PASS is set)
        .layer(middleware::from_fn(super::auth::basic_auth_middleware))
        .layer(Extension(state))
}

// ========== Lifecycle Handlers ==========

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_running: bool,
    pub proxy_mode: ProxyMode,
    pub socks_port: u16,
    pub http_port: u16,
    pub pac_port: u16,
    pub share_on_lan: bool,
    pub selected_server: Option<usize>,
}

async fn get_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    Json(StatusResponse {
        is_running: state.orchestrator.is_running().await,
        proxy_mode: config.proxy_mode,
        socks_port: config.socks_port,
        http_port: config.http_port,
        pac_port: config.pac_port,
        share_on_lan: config.share_on_lan,
        selected_server: config.selected_server,
    })
}

async fn restart(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!("Restart requested via control API");
    match state.orchestrator.restart().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => err_response(error_status(&e), &e.to_string()).into_response(),
    }
}

async fn stop(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!("Stop requested via control API");
    state.orchestrator.stop().await;
    StatusCode::OK
}

// ========== Config Handlers ==========

async fn get_config(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    Json(config)
}

async fn set_config(
    Extension(state): Extension<Arc<AppState>>,
    Json(config): Json<AppConfig>,
) -> impl IntoResponse {
    info!("Configuring application via control API");
    config.save();
    *state.config.write().await = config;

    // Port changes need a restart; a mode change can follow live.
    if let Err(e) = state.orchestrator.apply_proxy_mode().await {
        warn!("Failed to re-apply proxy mode after config change: {}", e);
    }

    StatusCode::OK
}

#[derive(serde::Deserialize)]
struct ModeRequest {
    mode: ProxyMode,
}

async fn set_mode(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> impl IntoResponse {
    {
        let mut config = state.config.write().await;
        config.proxy_mode = request.mode;
        config.save();
    }

    match state.orchestrator.apply_proxy_mode().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => err_response(error_status(&e), &e.to_string()).into_response(),
    }
}

// ========== Diagnostics Handlers ==========

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTestResult {
    pub working: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub test_time_ms: u64,
}

/// Probe URL for the chain test; a tiny always-on 204 endpoint.
const TEST_URL: &str = "http://www.gstatic.com/generate_204";

async fn test_proxy(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let http_port = state.config.read().await.http_port;
    Json(run_chain_test(http_port).await)
}

/// Fetch a known URL through the local HTTP endpoint to verify the whole
/// chain (helper + upstream client) is actually forwarding traffic. The
/// launches themselves are fire-and-forget, so this is the only direct
/// health signal available.
async fn run_chain_test(http_port: u16) -> ProxyTestResult {
    let start = std::time::Instant::now();

    let proxy_url = format!("http://127.0.0.1:{}", http_port);
    let client = match reqwest::Proxy::all(&proxy_url)
        .map_err(|e| e.to_string())
        .and_then(|proxy| {
            reqwest::Client::builder()
                .proxy(proxy)
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| e.to_string())
        }) {
        Ok(client) => client,
        Err(e) => {
            return ProxyTestResult {
                working: false,
                status: None,
                error: Some(format!("Failed to build test client: {}", e)),
                test_time_ms: start.elapsed().as_millis() as u64,
            };
        }
    };

    match client.get(TEST_URL).send().await {
        Ok(response) => {
            let status = response.status();
            let working = status.is_success();
            if working {
                info!("Proxy chain test passed via {} ({})", proxy_url, status);
            } else {
                warn!("Proxy chain test got unexpected status {}", status);
            }
            ProxyTestResult {
                working,
                status: Some(status.as_u16()),
                error: None,
                test_time_ms: start.elapsed().as_millis() as u64,
            }
        }
        Err(e) => {
            warn!("Proxy chain test failed: {}", e);
            ProxyTestResult {
                working: false,
                status: None,
                error: Some(e.to_string()),
                test_time_ms: start.elapsed().as_millis() as u64,
            }
        }
    }
}
