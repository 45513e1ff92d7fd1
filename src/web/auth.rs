//! Basic authentication for the control API.
//!
//! Auth is optional: it activates only when `PROXYPILOT_WEB_PASS` is set in
//! the environment (`PROXYPILOT_WEB_USER` defaults to "admin"). The control
//! API binds loopback by default, so this mainly guards shared machines.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use base64::Engine;
use tracing::warn;

/// Middleware enforcing HTTP Basic auth when a password is configured.
pub async fn basic_auth_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let expected_pass = match std::env::var("PROXYPILOT_WEB_PASS") {
        Ok(p) if !p.is_empty() => p,
        _ => return Ok(next.run(request).await),
    };
    let expected_user =
        std::env::var("PROXYPILOT_WEB_USER").unwrap_or_else(|_| "admin".to_string());

    let header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    match header.and_then(parse_basic_credentials) {
        Some((user, pass)) if user == expected_user && pass == expected_pass => {
            Ok(next.run(request).await)
        }
        Some((user, _)) => {
            warn!("Rejected control API credentials for user '{}'", user);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Control API request without valid Basic auth header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Decode an `Authorization: Basic <base64>` header into (user, password).
fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (user, pass) = credentials.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
