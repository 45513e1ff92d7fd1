//! Windows system proxy backend.
//!
//! Writes the WinINET proxy values under HKCU Internet Settings: manual mode
//! uses `ProxyEnable`/`ProxyServer`/`ProxyOverride`, PAC mode uses
//! `AutoConfigURL`. WinINET-aware applications pick the change up on their
//! next settings refresh.

use anyhow::{Context, Result};
use winreg::enums::HKEY_CURRENT_USER;
use winreg::RegKey;

const INTERNET_SETTINGS_PATH: &str =
    r"Software\Microsoft\Windows\CurrentVersion\Internet Settings";

fn open_internet_settings_key() -> Result<RegKey> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu
        .create_subkey(INTERNET_SETTINGS_PATH)
        .context("failed to open Internet Settings registry key")?;
    Ok(key)
}

/// WinINET expects semicolon-separated override entries.
fn proxy_override(bypass: &str) -> String {
    bypass.replace(',', ";")
}

pub(super) fn set_pac(url: &str, bypass: &str) -> Result<()> {
    let key = open_internet_settings_key()?;
    key.set_value("AutoConfigURL", &url.to_string())
        .context("failed to set AutoConfigURL")?;
    key.set_value("ProxyEnable", &0u32)
        .context("failed to set ProxyEnable")?;
    key.set_value("ProxyOverride", &proxy_override(bypass))
        .context("failed to set ProxyOverride")?;
    Ok(())
}

pub(super) fn set_manual(
    socks_host: &str,
    socks_port: u16,
    http_host: &str,
    http_port: u16,
    bypass: &str,
) -> Result<()> {
    let key = open_internet_settings_key()?;
    let server = format!(
        "http={http_host}:{http_port};https={http_host}:{http_port};socks={socks_host}:{socks_port}"
    );
    key.set_value("ProxyEnable", &1u32)
        .context("failed to set ProxyEnable")?;
    key.set_value("ProxyServer", &server)
        .context("failed to set ProxyServer")?;
    key.set_value("ProxyOverride", &proxy_override(bypass))
        .context("failed to set ProxyOverride")?;
    let _ = key.delete_value("AutoConfigURL");
    Ok(())
}

pub(super) fn clear() -> Result<()> {
    let key = open_internet_settings_key()?;
    key.set_value("ProxyEnable", &0u32)
        .context("failed to set ProxyEnable")?;
    let _ = key.delete_value("ProxyServer");
    let _ = key.delete_value("AutoConfigURL");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_uses_semicolon_separators() {
        assert_eq!(proxy_override("localhost,127.0.0.1,::1"), "localhost;127.0.0.1;::1");
    }
}
