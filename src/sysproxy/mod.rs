//! System proxy reconciliation.
//!
//! Makes the OS-level proxy configuration match the desired [`ProxyMode`].
//! The platform mechanics sit behind the [`SystemProxySettings`] seam; the
//! [`reconcile`] function only decides which call to make and with what
//! arguments. Failures propagate to the caller, there are no retries.

use anyhow::Result;
use tracing::info;

use crate::ProxyMode;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

/// Adapter over the platform's proxy settings store.
pub trait SystemProxySettings: Send + Sync {
    /// Remove every proxy setting this tool manages.
    fn clear_proxy(&self) -> Result<()>;

    /// Point the system at a PAC URL, with a bypass list applied.
    fn set_proxy_pac(&self, pac_url: &str, bypass: &str) -> Result<()>;

    /// Set manual SOCKS + HTTP proxy endpoints, with a bypass list applied.
    fn set_proxy(
        &self,
        socks_host: &str,
        socks_port: u16,
        http_host: &str,
        http_port: u16,
        bypass: &str,
    ) -> Result<()>;
}

/// Apply the proxy configuration matching `mode`. Exactly one adapter call
/// per invocation.
pub fn reconcile(
    settings: &dyn SystemProxySettings,
    mode: ProxyMode,
    socks_port: u16,
    http_port: u16,
    pac_port: u16,
    bypass: &str,
) -> Result<()> {
    match mode {
        ProxyMode::Direct => {
            info!("Clearing system proxy (direct mode)");
            settings.clear_proxy()
        }
        ProxyMode::Pac => {
            let url = format!("http://127.0.0.1:{}/proxy.pac", pac_port);
            info!("Setting system proxy to PAC {}", url);
            settings.set_proxy_pac(&url, bypass)
        }
        ProxyMode::Global => {
            info!(
                "Setting system proxy to socks 127.0.0.1:{} / http 127.0.0.1:{}",
                socks_port, http_port
            );
            settings.set_proxy("127.0.0.1", socks_port, "127.0.0.1", http_port, bypass)
        }
    }
}

/// [`SystemProxySettings`] implementation for the host OS.
pub struct OsProxySettings;

impl OsProxySettings {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OsProxySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProxySettings for OsProxySettings {
    fn clear_proxy(&self) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            windows::clear()
        }
        #[cfg(target_os = "macos")]
        {
            macos::clear()
        }
        #[cfg(target_os = "linux")]
        {
            linux::clear()
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            tracing::warn!("System proxy management is not supported on this platform");
            Ok(())
        }
    }

    fn set_proxy_pac(&self, pac_url: &str, bypass: &str) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            windows::set_pac(pac_url, bypass)
        }
        #[cfg(target_os = "macos")]
        {
            macos::set_pac(pac_url, bypass)
        }
        #[cfg(target_os = "linux")]
        {
            linux::set_pac(pac_url, bypass)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            let _ = (pac_url, bypass);
            tracing::warn!("System proxy management is not supported on this platform");
            Ok(())
        }
    }

    fn set_proxy(
        &self,
        socks_host: &str,
        socks_port: u16,
        http_host: &str,
        http_port: u16,
        bypass: &str,
    ) -> Result<()> {
        #[cfg(target_os = "windows")]
        {
            windows::set_manual(socks_host, socks_port, http_host, http_port, bypass)
        }
        #[cfg(target_os = "macos")]
        {
            macos::set_manual(socks_host, socks_port, http_host, http_port, bypass)
        }
        #[cfg(target_os = "linux")]
        {
            linux::set_manual(socks_host, socks_port, http_host, http_port, bypass)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            let _ = (socks_host, socks_port, http_host, http_port, bypass);
            tracing::warn!("System proxy management is not supported on this platform");
            Ok(())
        }
    }
}
