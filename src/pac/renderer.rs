//! PAC script rendering.
//!
//! Pure string substitution into the script template. The host placeholder
//! gets the address the requesting client reached us on, so a browser on the
//! LAN receives proxy endpoints it can actually route to.

/// Template placeholder for the proxy host visible to the client.
pub const HOST_PLACEHOLDER: &str = "__PAC_SCRIPT_PLACEHOLDER_HOST__";
/// Template placeholder for the local SOCKS port.
pub const SOCKS_PLACEHOLDER: &str = "__PAC_SCRIPT_PLACEHOLDER_SOCKS__";
/// Template placeholder for the local HTTP proxy port.
pub const HTTP_PLACEHOLDER: &str = "__PAC_SCRIPT_PLACEHOLDER_HTTP__";

/// Render the PAC script for one client.
pub fn render(template: &str, client_ip: &str, socks_port: u16, http_port: u16) -> String {
    template
        .replace(HOST_PLACEHOLDER, client_ip)
        .replace(SOCKS_PLACEHOLDER, &socks_port.to_string())
        .replace(HTTP_PLACEHOLDER, &http_port.to_string())
}

/// Strip a trailing `:port` from an HTTP Host header value.
pub fn host_without_port(host: &str) -> &str {
    match host.find(':') {
        Some(pos) => &host[..pos],
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str =
        "var proxy = \"SOCKS5 __PAC_SCRIPT_PLACEHOLDER_HOST__:__PAC_SCRIPT_PLACEHOLDER_SOCKS__; \
         PROXY __PAC_SCRIPT_PLACEHOLDER_HOST__:__PAC_SCRIPT_PLACEHOLDER_HTTP__\";";

    #[test]
    fn substitutes_all_placeholders() {
        let script = render(TEMPLATE, "10.0.0.5", 1080, 8118);
        assert!(script.contains("SOCKS5 10.0.0.5:1080"));
        assert!(script.contains("PROXY 10.0.0.5:8118"));
        assert!(!script.contains("__PAC_SCRIPT_PLACEHOLDER"));
    }

    #[test]
    fn render_is_deterministic() {
        let first = render(TEMPLATE, "10.0.0.5", 1080, 8118);
        let second = render(TEMPLATE, "10.0.0.5", 1080, 8118);
        assert_eq!(first, second);
    }

    #[test]
    fn host_strips_port() {
        assert_eq!(host_without_port("192.168.1.10:8118"), "192.168.1.10");
        assert_eq!(host_without_port("192.168.1.10"), "192.168.1.10");
        assert_eq!(host_without_port(":1082"), "");
    }
}
