//! macOS system proxy backend.
//!
//! Proxy settings are per network service on macOS, so every operation is
//! applied to each enabled service reported by
//! `networksetup -listallnetworkservices`.

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};

fn networksetup(args: &[&str]) -> Result<()> {
    let status = Command::new("networksetup")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run networksetup")?;
    if !status.success() {
        bail!("networksetup {:?} exited with {}", args, status);
    }
    Ok(())
}

/// Enabled network services; disabled entries are prefixed with '*'.
fn network_services() -> Vec<String> {
    let output = Command::new("networksetup")
        .arg("-listallnetworkservices")
        .output();

    if let Ok(out) = output {
        if out.status.success() {
            let services: Vec<String> = String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter(|line| !line.starts_with("An asterisk ("))
                .filter(|line| !line.starts_with('*'))
                .map(str::to_string)
                .collect();
            if !services.is_empty() {
                return services;
            }
        }
    }

    vec!["Wi-Fi".to_string(), "Ethernet".to_string()]
}

fn bypass_domains(bypass: &str) -> Vec<String> {
    bypass
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply_bypass(service: &str, bypass: &str) -> Result<()> {
    let domains = bypass_domains(bypass);
    if domains.is_empty() {
        return Ok(());
    }
    let mut args = vec!["-setproxybypassdomains".to_string(), service.to_string()];
    args.extend(domains);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    networksetup(&arg_refs)
}

pub(super) fn set_pac(url: &str, bypass: &str) -> Result<()> {
    for service in network_services() {
        networksetup(&["-setautoproxyurl", &service, url])?;
        networksetup(&["-setautoproxystate", &service, "on"])?;
        apply_bypass(&service, bypass)?;
    }
    Ok(())
}

pub(super) fn set_manual(
    socks_host: &str,
    socks_port: u16,
    http_host: &str,
    http_port: u16,
    bypass: &str,
) -> Result<()> {
    let socks_port = socks_port.to_string();
    let http_port = http_port.to_string();

    for service in network_services() {
        networksetup(&["-setsocksfirewallproxy", &service, socks_host, &socks_port])?;
        networksetup(&["-setsocksfirewallproxystate", &service, "on"])?;
        networksetup(&["-setwebproxy", &service, http_host, &http_port])?;
        networksetup(&["-setwebproxystate", &service, "on"])?;
        networksetup(&["-setsecurewebproxy", &service, http_host, &http_port])?;
        networksetup(&["-setsecurewebproxystate", &service, "on"])?;
        apply_bypass(&service, bypass)?;
    }
    Ok(())
}

pub(super) fn clear() -> Result<()> {
    for service in network_services() {
        networksetup(&["-setautoproxystate", &service, "off"])?;
        networksetup(&["-setsocksfirewallproxystate", &service, "off"])?;
        networksetup(&["-setwebproxystate", &service, "off"])?;
        networksetup(&["-setsecurewebproxystate", &service, "off"])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_list_splits_on_commas_and_semicolons() {
        assert_eq!(
            bypass_domains("localhost,127.0.0.1; *.local"),
            vec!["localhost", "127.0.0.1", "*.local"]
        );
        assert!(bypass_domains("").is_empty());
    }
}
