//! Lifecycle orchestration for the proxy services.
//!
//! Two stable states, stopped and running. `restart` tears everything down,
//! gates on port availability, then brings services up in dependency order:
//! upstream client, filtering helper, PAC server, and finally the system
//! proxy settings, so traffic is never routed at endpoints that are not yet
//! listening. `stop` is best-effort and safe to call in any state.
//!
//! Restart/stop invocations are serialized behind the state mutex;
//! concurrent callers queue rather than race on the PAC handle.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::client::{ClientError, ClientRegistry};
use crate::helper::HelperSupervisor;
use crate::pac::{PacServer, PacServerHandle};
use crate::paths;
use crate::ports;
use crate::sysproxy::{self, SystemProxySettings};
use crate::AppConfig;

/// Which local service a conflicting port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortService {
    Socks,
    Http,
    Pac,
}

impl std::fmt::Display for PortService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortService::Socks => write!(f, "Socks"),
            PortService::Http => write!(f, "Http"),
            PortService::Pac => write!(f, "PAC"),
        }
    }
}

/// Orchestration errors surfaced to the caller.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{service} port {port} is in use by another program")]
    PortInUse { service: PortService, port: u16 },

    #[error("no upstream server selected; select a server first")]
    NoServerSelected,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to apply system proxy settings: {0}")]
    SystemProxy(#[source] anyhow::Error),
}

/// Mutable orchestrator state, guarded by the state mutex. The PAC handle
/// owns both the background task and its shutdown channel, so service and
/// task always live and die together.
#[derive(Default)]
struct OrchestratorState {
    running: bool,
    pac_server: Option<PacServerHandle>,
}

/// Composes the upstream client, filtering helper, PAC server and system
/// proxy settings into one start/stop/restart lifecycle.
pub struct Orchestrator {
    config: Arc<RwLock<AppConfig>>,
    clients: Arc<dyn ClientRegistry>,
    system_proxy: Arc<dyn SystemProxySettings>,
    helper: HelperSupervisor,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<RwLock<AppConfig>>,
        clients: Arc<dyn ClientRegistry>,
        system_proxy: Arc<dyn SystemProxySettings>,
    ) -> Self {
        Self {
            config,
            clients,
            system_proxy,
            helper: HelperSupervisor::new(),
            state: Mutex::new(OrchestratorState::default()),
        }
    }

    /// Whether the services are currently up.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Tear everything down. Idempotent, never fails outwardly; each cleanup
    /// step is best-effort regardless of what the previous ones found.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    async fn stop_locked(&self, state: &mut OrchestratorState) {
        let config = self.config.read().await.clone();

        if let Err(e) = self.system_proxy.clear_proxy() {
            warn!("Failed to clear system proxy: {}", e);
        }
        self.clients.stop_all(&config.servers);
        self.helper.kill();
        if let Some(pac) = state.pac_server.take() {
            // Blocking stop: wait until the listener socket is released so a
            // following restart can rebind the same port.
            pac.stop().await;
        }
        state.running = false;
    }

    /// Stop everything, then bring the services back up with the current
    /// configuration.
    ///
    /// Port checks run after the stop (which frees our own ports) and before
    /// anything starts, failing fast on the first conflict without touching
    /// any service.
    pub async fn restart(&self) -> Result<(), OrchestratorError> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;

        let config = self.config.read().await.clone();

        for (service, port) in [
            (PortService::Socks, config.socks_port),
            (PortService::Http, config.http_port),
            (PortService::Pac, config.pac_port),
        ] {
            if ports::is_port_in_use(port).await {
                return Err(OrchestratorError::PortInUse { service, port });
            }
        }

        let index = config
            .selected_server
            .ok_or(OrchestratorError::NoServerSelected)?;
        let server = config
            .servers
            .get(index)
            .ok_or(ClientError::ServerNotFound(index))?;
        self.clients.start(server)?;

        if let Err(e) = self.helper.restart(&config) {
            // Fire-and-forget model: a dead helper is only observable
            // through its port, never through the orchestrator state.
            warn!("Filtering helper failed to start: {}", e);
        }

        match PacServer::start(
            config.bind_address(),
            config.pac_port,
            paths::pac_template(),
            config.socks_port,
            config.http_port,
        )
        .await
        {
            Ok(handle) => state.pac_server = Some(handle),
            Err(e) => warn!(
                "PAC server failed to bind {}:{}: {}",
                config.bind_address(),
                config.pac_port,
                e
            ),
        }

        sysproxy::reconcile(
            self.system_proxy.as_ref(),
            config.proxy_mode,
            config.socks_port,
            config.http_port,
            config.pac_port,
            &config.proxy_bypass,
        )
        .map_err(OrchestratorError::SystemProxy)?;

        state.running = true;
        info!("Proxy services running (mode {:?})", config.proxy_mode);
        Ok(())
    }

    /// Re-apply the system proxy settings for the current mode without a
    /// full restart. No-op while stopped.
    pub async fn apply_proxy_mode(&self) -> Result<(), OrchestratorError> {
        let state = self.state.lock().await;
        if !state.running {
            return Ok(());
        }

        let config = self.config.read().await.clone();
        sysproxy::reconcile(
            self.system_proxy.as_ref(),
            config.proxy_mode,
            config.socks_port,
            config.http_port,
            config.pac_port,
            &config.proxy_bypass,
        )
        .map_err(OrchestratorError::SystemProxy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientLaunch;
    use crate::sysproxy::testing::RecordingSettings;
    use crate::{ProxyMode, ServerEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct MockRegistry {
        started: AtomicUsize,
    }

    impl MockRegistry {
        fn new() -> Self {
            Self { started: AtomicUsize::new(0) }
        }

        fn start_count(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    impl ClientRegistry for MockRegistry {
        fn start(&self, _server: &ServerEntry) -> Result<ClientLaunch, ClientError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(ClientLaunch { pid: 4242 })
        }

        fn stop_all(&self, _servers: &[ServerEntry]) {}
    }

    /// Reserve `n` distinct loopback ports, then release them for the test.
    async fn free_ports(n: usize) -> Vec<u16> {
        let mut listeners = Vec::new();
        for _ in 0..n {
            listeners.push(TcpListener::bind(("127.0.0.1", 0)).await.unwrap());
        }
        listeners
            .iter()
            .map(|l| l.local_addr().unwrap().port())
            .collect()
    }

    fn test_config(socks: u16, http: u16, pac: u16) -> AppConfig {
        AppConfig {
            socks_port: socks,
            http_port: http,
            pac_port: pac,
            share_on_lan: false,
            proxy_mode: ProxyMode::Pac,
            proxy_bypass: "localhost".to_string(),
            servers: vec![ServerEntry {
                name: "test upstream".to_string(),
                bin: "proxypilot-test-client".to_string(),
                args: vec![],
            }],
            selected_server: Some(0),
        }
    }

    fn build(
        config: AppConfig,
    ) -> (Orchestrator, Arc<MockRegistry>, Arc<RecordingSettings>, Arc<RwLock<AppConfig>>) {
        let registry = Arc::new(MockRegistry::new());
        let settings = Arc::new(RecordingSettings::new());
        let shared = Arc::new(RwLock::new(config));
        let orchestrator = Orchestrator::new(shared.clone(), registry.clone(), settings.clone());
        (orchestrator, registry, settings, shared)
    }

    #[tokio::test]
    async fn restart_aborts_on_first_occupied_port() {
        let ports = free_ports(3).await;
        let blocker = TcpListener::bind(("127.0.0.1", ports[0])).await.unwrap();

        let (orchestrator, registry, settings, _) =
            build(test_config(ports[0], ports[1], ports[2]));

        match orchestrator.restart().await {
            Err(OrchestratorError::PortInUse { service, port }) => {
                assert_eq!(service, PortService::Socks);
                assert_eq!(port, ports[0]);
            }
            other => panic!("expected port conflict, got {:?}", other),
        }

        assert!(!orchestrator.is_running().await);
        assert_eq!(registry.start_count(), 0);
        // The initial stop clears the system proxy, but nothing was set.
        assert!(settings.calls().iter().all(|c| c == "clear"));
        // The PAC service was never started either.
        assert!(!ports::is_port_in_use(ports[2]).await);
        drop(blocker);
    }

    #[tokio::test]
    async fn restart_aborts_when_the_pac_port_is_taken() {
        let ports = free_ports(3).await;
        let blocker = TcpListener::bind(("127.0.0.1", ports[2])).await.unwrap();

        let (orchestrator, registry, _, _) = build(test_config(ports[0], ports[1], ports[2]));

        match orchestrator.restart().await {
            Err(OrchestratorError::PortInUse { service, port }) => {
                assert_eq!(service, PortService::Pac);
                assert_eq!(port, ports[2]);
            }
            other => panic!("expected port conflict, got {:?}", other),
        }

        assert!(!orchestrator.is_running().await);
        assert_eq!(registry.start_count(), 0);
        drop(blocker);
    }

    #[tokio::test]
    async fn restart_requires_a_selected_server() {
        let ports = free_ports(3).await;
        let mut config = test_config(ports[0], ports[1], ports[2]);
        config.selected_server = None;

        let (orchestrator, registry, _, _) = build(config);

        assert!(matches!(
            orchestrator.restart().await,
            Err(OrchestratorError::NoServerSelected)
        ));
        assert!(!orchestrator.is_running().await);
        assert_eq!(registry.start_count(), 0);
    }

    #[tokio::test]
    async fn restart_reports_a_stale_server_index() {
        let ports = free_ports(3).await;
        let mut config = test_config(ports[0], ports[1], ports[2]);
        config.selected_server = Some(7);

        let (orchestrator, _, _, _) = build(config);

        assert!(matches!(
            orchestrator.restart().await,
            Err(OrchestratorError::Client(ClientError::ServerNotFound(7)))
        ));
        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn stop_when_already_stopped_is_a_noop() {
        let (orchestrator, _, _, _) = build(test_config(11080, 11081, 11082));

        orchestrator.stop().await;
        orchestrator.stop().await;

        assert!(!orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn restart_brings_services_up_and_stop_tears_them_down() {
        let ports = free_ports(3).await;
        let (orchestrator, registry, settings, _) =
            build(test_config(ports[0], ports[1], ports[2]));

        orchestrator.restart().await.unwrap();
        assert!(orchestrator.is_running().await);
        assert_eq!(registry.start_count(), 1);

        // The reconciler ran once for PAC mode with our PAC port.
        let expected = format!("pac http://127.0.0.1:{}/proxy.pac [localhost]", ports[2]);
        assert!(settings.calls().contains(&expected));

        // The PAC endpoint is actually listening.
        assert!(ports::is_port_in_use(ports[2]).await);

        orchestrator.stop().await;
        assert!(!orchestrator.is_running().await);

        // Blocking stop released the PAC port.
        assert!(!ports::is_port_in_use(ports[2]).await);
    }

    #[tokio::test]
    async fn restart_twice_rebinds_the_pac_port() {
        let ports = free_ports(3).await;
        let (orchestrator, registry, _, _) = build(test_config(ports[0], ports[1], ports[2]));

        orchestrator.restart().await.unwrap();
        // The second restart's internal stop must join the first PAC
        // listener before the port check and rebind can succeed.
        orchestrator.restart().await.unwrap();

        assert!(orchestrator.is_running().await);
        assert_eq!(registry.start_count(), 2);
        assert!(ports::is_port_in_use(ports[2]).await);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn mode_changes_apply_without_a_restart() {
        let ports = free_ports(3).await;
        let (orchestrator, _, settings, config) = build(test_config(ports[0], ports[1], ports[2]));

        orchestrator.restart().await.unwrap();
        config.write().await.proxy_mode = ProxyMode::Direct;
        orchestrator.apply_proxy_mode().await.unwrap();

        assert_eq!(settings.calls().last().unwrap(), "clear");

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn apply_proxy_mode_is_a_noop_while_stopped() {
        let (orchestrator, _, settings, _) = build(test_config(11090, 11091, 11092));

        orchestrator.apply_proxy_mode().await.unwrap();
        assert!(settings.calls().is_empty());
    }
}
