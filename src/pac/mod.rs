//! PAC (Proxy Auto-Configuration) serving.
//!
//! `renderer` turns the script template into a per-client PAC body;
//! `server` runs the HTTP endpoint that hands it to browsers.

pub mod renderer;
pub mod server;

pub use server::{PacServer, PacServerHandle};
