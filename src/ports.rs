//! Port availability probing.
//!
//! Used as a precondition gate before activating services: the probe binds
//! the port on loopback and releases it immediately. Advisory only; the port
//! may be taken again between the check and the real bind.

use tokio::net::TcpListener;

/// Returns true when `127.0.0.1:port` cannot be bound, i.e. another program
/// already listens there.
pub async fn is_port_in_use(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(_) => true,
    }
}
