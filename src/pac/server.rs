//! The PAC HTTP service.
//!
//! A small axum server with a single route, `GET /proxy.pac`. The handler
//! personalizes the script per request from the Host header, so LAN clients
//! get proxy endpoints pointing at the address they reached us on. The
//! template and ports are snapshotted at start time; a restart picks up
//! config changes.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::renderer;

/// MIME type browsers expect for PAC scripts.
pub const PAC_CONTENT_TYPE: &str = "application/x-ns-proxy-autoconfig";

/// Fallback client address when a request carries no Host header.
const LOOPBACK_HOST: &str = "127.0.0.1";

/// Immutable snapshot the request handler renders from.
struct PacContent {
    template: String,
    socks_port: u16,
    http_port: u16,
}

/// The PAC HTTP service. `start` hands back an owned [`PacServerHandle`];
/// the service runs until the handle stops it.
pub struct PacServer;

impl PacServer {
    /// Bind `bind_addr:port` and serve `/proxy.pac` in a background task.
    ///
    /// Binding happens before the task is spawned, so a taken port surfaces
    /// here as an error instead of dying silently in the background.
    pub async fn start(
        bind_addr: &str,
        port: u16,
        template: String,
        socks_port: u16,
        http_port: u16,
    ) -> io::Result<PacServerHandle> {
        let ip: IpAddr = bind_addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        let content = Arc::new(PacContent {
            template,
            socks_port,
            http_port,
        });

        let app = Router::new()
            .route("/proxy.pac", get(serve_pac))
            .with_state(content);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("PAC server error: {}", e);
            }
        });

        info!("PAC server started at http://{}/proxy.pac", addr);

        Ok(PacServerHandle {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Owned handle to a running PAC service: the background task plus its
/// shutdown channel. Dropping the handle requests shutdown without waiting.
pub struct PacServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PacServerHandle {
    /// Address the listener is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request shutdown without waiting for the listener to close.
    /// Idempotent.
    pub fn request_stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Stop the service and wait until the listener socket is released.
    pub async fn stop(mut self) {
        self.request_stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("PAC server stopped");
    }
}

impl Drop for PacServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_pac(State(content): State<Arc<PacContent>>, headers: HeaderMap) -> impl IntoResponse {
    let client_ip = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(renderer::host_without_port)
        .filter(|host| !host.is_empty())
        .unwrap_or(LOOPBACK_HOST);

    debug!("Serving PAC script for client host {}", client_ip);

    let body = renderer::render(
        &content.template,
        client_ip,
        content.socks_port,
        content.http_port,
    );

    ([(header::CONTENT_TYPE, PAC_CONTENT_TYPE)], body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    const TEMPLATE: &str = "PROXY __PAC_SCRIPT_PLACEHOLDER_HOST__:__PAC_SCRIPT_PLACEHOLDER_HTTP__; \
                            SOCKS5 __PAC_SCRIPT_PLACEHOLDER_HOST__:__PAC_SCRIPT_PLACEHOLDER_SOCKS__";

    async fn start_server() -> PacServerHandle {
        PacServer::start("127.0.0.1", 0, TEMPLATE.to_string(), 1080, 8118)
            .await
            .unwrap()
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn renders_client_ip_from_host_header() {
        let handle = start_server().await;
        let request =
            "GET /proxy.pac HTTP/1.1\r\nHost: 192.168.1.10:8118\r\nConnection: close\r\n\r\n";
        let response = raw_request(handle.addr(), request).await;

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(PAC_CONTENT_TYPE));
        assert!(response.contains("PROXY 192.168.1.10:8118"));
        assert!(response.contains("SOCKS5 192.168.1.10:1080"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn missing_host_header_defaults_to_loopback() {
        let handle = start_server().await;
        // HTTP/1.0 requests may omit the Host header entirely.
        let response = raw_request(handle.addr(), "GET /proxy.pac HTTP/1.0\r\n\r\n").await;

        assert!(response.contains("PROXY 127.0.0.1:8118"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let handle = start_server().await;
        let request = "GET /other HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n";
        let response = raw_request(handle.addr(), request).await;

        assert!(response.starts_with("HTTP/1.1 404"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let handle = start_server().await;
        let addr = handle.addr();
        handle.stop().await;

        // The socket must be free again once stop returns.
        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn request_stop_is_idempotent() {
        let mut handle = start_server().await;
        handle.request_stop();
        handle.request_stop();
        handle.stop().await;
    }
}
