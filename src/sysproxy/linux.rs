//! Linux system proxy backend.
//!
//! GNOME desktops are configured through `gsettings`, KDE through
//! `kwriteconfig5`. When neither tool is available the call is a logged
//! no-op; there is no portable proxy store to write to.

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::warn;

#[derive(Clone, Copy, Debug)]
enum Backend {
    Gnome,
    Kde,
    None,
}

fn backend() -> Backend {
    let de = std::env::var("XDG_CURRENT_DESKTOP").unwrap_or_default().to_lowercase();
    let kde = de.contains("kde") || de.contains("plasma");

    if !kde && which("gsettings") {
        return Backend::Gnome;
    }
    if which("kwriteconfig5") {
        return Backend::Kde;
    }
    if which("gsettings") {
        return Backend::Gnome;
    }
    Backend::None
}

fn which(bin: &str) -> bool {
    Command::new("which")
        .arg(bin)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn gsettings(args: &[&str]) -> Result<()> {
    let status = Command::new("gsettings")
        .args(args)
        .status()
        .context("failed to run gsettings")?;
    if !status.success() {
        bail!("gsettings {:?} exited with {}", args, status);
    }
    Ok(())
}

fn kwrite(key: &str, value: &str) -> Result<()> {
    let status = Command::new("kwriteconfig5")
        .args(["--file", "kioslaverc", "--group", "Proxy Settings", "--key", key, value])
        .status()
        .context("failed to run kwriteconfig5")?;
    if !status.success() {
        bail!("kwriteconfig5 for key {} exited with {}", key, status);
    }
    Ok(())
}

fn kde_reconfigure() {
    let _ = Command::new("qdbus")
        .args(["org.kde.kded5", "/kded", "reconfigure"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Format a bypass list as the GVariant string array `ignore-hosts` expects.
fn ignore_hosts_array(bypass: &str) -> String {
    let items: Vec<String> = bypass
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("'{}'", s))
        .collect();
    format!("[{}]", items.join(","))
}

pub(super) fn set_pac(url: &str, bypass: &str) -> Result<()> {
    match backend() {
        Backend::Gnome => {
            gsettings(&["set", "org.gnome.system.proxy", "mode", "auto"])?;
            gsettings(&["set", "org.gnome.system.proxy", "autoconfig-url", url])?;
            gsettings(&["set", "org.gnome.system.proxy", "ignore-hosts", &ignore_hosts_array(bypass)])?;
            Ok(())
        }
        Backend::Kde => {
            kwrite("ProxyType", "1")?;
            kwrite("Proxy Config Script", url)?;
            kwrite("NoProxyFor", bypass)?;
            kde_reconfigure();
            Ok(())
        }
        Backend::None => {
            warn!("No system proxy backend found (gsettings/kwriteconfig5); PAC mode not applied");
            Ok(())
        }
    }
}

pub(super) fn set_manual(
    socks_host: &str,
    socks_port: u16,
    http_host: &str,
    http_port: u16,
    bypass: &str,
) -> Result<()> {
    match backend() {
        Backend::Gnome => {
            gsettings(&["set", "org.gnome.system.proxy", "mode", "manual"])?;
            gsettings(&["set", "org.gnome.system.proxy.socks", "host", socks_host])?;
            gsettings(&["set", "org.gnome.system.proxy.socks", "port", &socks_port.to_string()])?;
            gsettings(&["set", "org.gnome.system.proxy.http", "host", http_host])?;
            gsettings(&["set", "org.gnome.system.proxy.http", "port", &http_port.to_string()])?;
            gsettings(&["set", "org.gnome.system.proxy.https", "host", http_host])?;
            gsettings(&["set", "org.gnome.system.proxy.https", "port", &http_port.to_string()])?;
            gsettings(&["set", "org.gnome.system.proxy", "ignore-hosts", &ignore_hosts_array(bypass)])?;
            Ok(())
        }
        Backend::Kde => {
            kwrite("ProxyType", "2")?;
            kwrite("socksProxy", &format!("socks://{}:{}", socks_host, socks_port))?;
            kwrite("httpProxy", &format!("http://{}:{}", http_host, http_port))?;
            kwrite("httpsProxy", &format!("http://{}:{}", http_host, http_port))?;
            kwrite("NoProxyFor", bypass)?;
            kde_reconfigure();
            Ok(())
        }
        Backend::None => {
            warn!("No system proxy backend found (gsettings/kwriteconfig5); manual mode not applied");
            Ok(())
        }
    }
}

pub(super) fn clear() -> Result<()> {
    match backend() {
        Backend::Gnome => {
            gsettings(&["set", "org.gnome.system.proxy", "mode", "none"])?;
            Ok(())
        }
        Backend::Kde => {
            kwrite("ProxyType", "0")?;
            kwrite("socksProxy", "")?;
            kwrite("httpProxy", "")?;
            kwrite("httpsProxy", "")?;
            kde_reconfigure();
            Ok(())
        }
        Backend::None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_hosts_formats_a_gvariant_array() {
        assert_eq!(
            ignore_hosts_array("localhost,127.0.0.1,::1"),
            "['localhost','127.0.0.1','::1']"
        );
        assert_eq!(ignore_hosts_array("localhost; 10.0.0.1"), "['localhost','10.0.0.1']");
        assert_eq!(ignore_hosts_array(""), "[]");
    }
}
