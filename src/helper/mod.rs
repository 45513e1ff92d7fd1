//! Filtering helper supervision.
//!
//! Manages the single bundled privoxy instance that chains HTTP traffic into
//! the upstream SOCKS endpoint. The process is launched detached with a
//! config file rendered from the bundled template; duplicate instances are
//! prevented by killing any previous instance by name before launching.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::paths;
use crate::procs;
use crate::AppConfig;

/// Well-known name of the bundled filtering helper binary.
#[cfg(windows)]
pub const HELPER_BIN: &str = "proxypilot_privoxy.exe";
#[cfg(not(windows))]
pub const HELPER_BIN: &str = "proxypilot_privoxy";

/// Name of the rendered config file in the tmp dir.
const HELPER_CONF: &str = "privoxy.conf";
/// Name of the helper's log file in the log dir.
const HELPER_LOG: &str = "privoxy.log";

/// Helper supervision errors.
#[derive(Error, Debug)]
pub enum HelperError {
    #[error("failed to prepare helper config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to launch helper {bin}: {source}")]
    Launch {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a successful helper launch. The process is not supervised
/// beyond this; a later crash is only observable through its port.
#[derive(Debug, Clone, Copy)]
pub struct HelperLaunch {
    pub pid: u32,
}

/// Supervisor for the filtering helper process.
pub struct HelperSupervisor;

impl HelperSupervisor {
    pub fn new() -> Self {
        Self
    }

    /// Kill any running instance, render a fresh config, clear the stale log
    /// and launch the helper detached.
    pub fn restart(&self, config: &AppConfig) -> Result<HelperLaunch, HelperError> {
        self.kill();

        let conf_path = paths::tmp_dir_file(HELPER_CONF)?;
        let log_path = paths::log_dir_file(HELPER_LOG)?;

        let rendered = render_config(
            &paths::helper_config_template(),
            config.bind_address(),
            config.http_port,
            &log_path.to_string_lossy(),
            "127.0.0.1",
            config.socks_port,
        );
        std::fs::write(&conf_path, rendered)?;

        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let bin = paths::bin_dir_file(HELPER_BIN)?;
        let conf_arg = conf_path.to_string_lossy();
        let child = procs::spawn_detached(&bin, &[conf_arg.as_ref()])
            .map_err(|source| HelperError::Launch { bin: bin.clone(), source })?;
        let pid = child.id();

        info!(
            "Helper started at {}:{} (pid {})",
            config.bind_address(),
            config.http_port,
            pid
        );

        Ok(HelperLaunch { pid })
    }

    /// Terminate any running helper instance. No-op when none is running.
    pub fn kill(&self) {
        procs::kill_process_by_name(HELPER_BIN);
        info!("Helper stopped");
    }
}

impl Default for HelperSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute the helper config template placeholders.
fn render_config(
    template: &str,
    bind_ip: &str,
    bind_port: u16,
    log_file: &str,
    socks_host: &str,
    socks_port: u16,
) -> String {
    template
        .replace("__PRIVOXY_BIND_IP__", bind_ip)
        .replace("__PRIVOXY_BIND_PORT__", &bind_port.to_string())
        .replace("__PRIVOXY_LOG_FILE__", log_file)
        .replace("__SOCKS_HOST__", socks_host)
        .replace("__SOCKS_PORT__", &socks_port.to_string())
}
