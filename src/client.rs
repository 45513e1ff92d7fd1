//! Upstream client registry.
//!
//! The orchestrator treats the upstream proxy client as an opaque
//! controllable process behind the [`ClientRegistry`] seam. The default
//! implementation launches the configured server command detached and tears
//! clients down by binary name, the same model used for the filtering
//! helper.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::procs;
use crate::ServerEntry;

/// Client registry errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no upstream server configured at index {0}")]
    ServerNotFound(usize),

    #[error("failed to launch upstream client {bin}: {source}")]
    Launch {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a successful client launch. Like the helper, the process is not
/// supervised further.
#[derive(Debug, Clone, Copy)]
pub struct ClientLaunch {
    pub pid: u32,
}

/// Start/stop seam for upstream proxy client processes.
pub trait ClientRegistry: Send + Sync {
    /// Launch the client process for `server`.
    fn start(&self, server: &ServerEntry) -> Result<ClientLaunch, ClientError>;

    /// Stop every client process belonging to the given servers. Best-effort
    /// and idempotent.
    fn stop_all(&self, servers: &[ServerEntry]);
}

/// Registry launching each server's configured command as a detached OS
/// process.
pub struct ProcessClientRegistry;

impl ProcessClientRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry for ProcessClientRegistry {
    fn start(&self, server: &ServerEntry) -> Result<ClientLaunch, ClientError> {
        let bin = PathBuf::from(&server.bin);
        let args: Vec<&str> = server.args.iter().map(String::as_str).collect();

        let child = procs::spawn_detached(&bin, &args)
            .map_err(|source| ClientError::Launch { bin: bin.clone(), source })?;
        let pid = child.id();

        info!("Upstream client '{}' started (pid {})", server.name, pid);

        Ok(ClientLaunch { pid })
    }

    fn stop_all(&self, servers: &[ServerEntry]) {
        for server in servers {
            if let Some(name) = process_name(&server.bin) {
                procs::kill_process_by_name(name);
            }
        }
        info!("Upstream clients stopped");
    }
}

/// Process name a server's client runs under, derived from its binary path.
fn process_name(bin: &str) -> Option<&str> {
    Path::new(bin).file_name().and_then(|n| n.to_str())
}
