//! proxypilot
//!
//! A local proxy switching supervisor. Manages an upstream proxy client, a
//! privoxy-style HTTP filtering helper, and an embedded PAC server, and keeps
//! the operating system's proxy configuration in sync with the selected mode.

pub mod client;
pub mod helper;
pub mod orchestrator;
pub mod pac;
pub mod paths;
pub mod ports;
mod procs;
pub mod sysproxy;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use client::ProcessClientRegistry;
use orchestrator::Orchestrator;
use sysproxy::OsProxySettings;

/// System proxy mode selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// No system proxy; traffic goes out directly.
    Direct,
    /// System proxy points at the PAC URL served by this process.
    Pac,
    /// System proxy points at the local SOCKS/HTTP endpoints for all traffic.
    Global,
}

/// An upstream proxy server entry: the command that runs its client process.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    /// Display name
    pub name: String,
    /// Client binary to launch
    pub bin: String,
    /// Arguments passed to the client binary
    #[serde(default)]
    pub args: Vec<String>,
}

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Local SOCKS port exposed by the upstream client
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
    /// Local HTTP port exposed by the filtering helper
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Port the PAC server listens on
    #[serde(default = "default_pac_port")]
    pub pac_port: u16,

    /// Bind services on all interfaces instead of loopback only
    #[serde(default)]
    pub share_on_lan: bool,

    /// How the system proxy is configured while running
    #[serde(default = "default_proxy_mode")]
    pub proxy_mode: ProxyMode,

    /// Hosts excluded from proxying, passed verbatim to the OS adapter
    #[serde(default = "default_proxy_bypass")]
    pub proxy_bypass: String,

    /// Known upstream servers
    #[serde(default)]
    pub servers: Vec<ServerEntry>,

    /// Index into `servers` of the active upstream, if any
    #[serde(default)]
    pub selected_server: Option<usize>,
}

fn default_socks_port() -> u16 { 1080 }
fn default_http_port() -> u16 { 1081 }
fn default_pac_port() -> u16 { 1082 }
fn default_proxy_mode() -> ProxyMode { ProxyMode::Pac }
fn default_proxy_bypass() -> String { "localhost,127.0.0.1,::1".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            socks_port: default_socks_port(),
            http_port: default_http_port(),
            pac_port: default_pac_port(),
            share_on_lan: false,
            proxy_mode: default_proxy_mode(),
            proxy_bypass: default_proxy_bypass(),
            servers: vec![],
            selected_server: None,
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("proxypilot").join("logs"))
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("proxypilot").join("config.json"))
    }

    /// Address services bind to, depending on the LAN sharing flag.
    pub fn bind_address(&self) -> &'static str {
        if self.share_on_lan { "0.0.0.0" } else { "127.0.0.1" }
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Application state shared across the app
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,
    /// Lifecycle orchestrator for the proxy services
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Create new application state with loaded config
    pub fn new() -> Self {
        let config = Arc::new(RwLock::new(AppConfig::load()));

        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            Arc::new(ProcessClientRegistry::new()),
            Arc::new(OsProxySettings::new()),
        ));

        Self { config, orchestrator }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging (console + daily rolling file)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "proxypilot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_mode_serde_roundtrip() {
        let json = serde_json::to_string(&ProxyMode::Pac).unwrap();
        assert_eq!(json, "\"pac\"");
        let mode: ProxyMode = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(mode, ProxyMode::Global);
    }

    #[test]
    fn config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.socks_port, 1080);
        assert_eq!(config.http_port, 1081);
        assert_eq!(config.pac_port, 1082);
        assert_eq!(config.bind_address(), "127.0.0.1");
        assert!(config.selected_server.is_none());
    }

    #[test]
    fn bind_address_follows_lan_sharing() {
        let config = AppConfig { share_on_lan: true, ..Default::default() };
        assert_eq!(config.bind_address(), "0.0.0.0");
    }

    #[test]
    fn config_parses_partial_json() {
        // Older config files may miss newer fields; serde defaults fill them in.
        let config: AppConfig = serde_json::from_str(r#"{"socksPort": 7890}"#).unwrap();
        assert_eq!(config.socks_port, 7890);
        assert_eq!(config.http_port, 1081);
        assert_eq!(config.proxy_mode, ProxyMode::Pac);
    }
}
