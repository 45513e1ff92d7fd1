//! Path and template resolution.
//!
//! Generated files (the rendered helper config) go to a per-app directory
//! under the system temp dir. Script/config templates ship embedded in the
//! binary and can be overridden by files in `PROXYPILOT_ASSETS_DIR`. The
//! helper binary is looked up next to the running executable, overridable
//! via `PROXYPILOT_BIN_DIR`.

use std::io;
use std::path::PathBuf;

/// Embedded PAC script template.
const PAC_TEMPLATE: &str = include_str!("../assets/proxy.pac");
/// Embedded filtering-helper config template.
const HELPER_CONFIG_TEMPLATE: &str = include_str!("../assets/privoxy.conf");

/// Directory for generated runtime files, created on demand.
pub fn tmp_dir() -> io::Result<PathBuf> {
    let dir = std::env::temp_dir().join("proxypilot");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of a generated runtime file.
pub fn tmp_dir_file(name: &str) -> io::Result<PathBuf> {
    Ok(tmp_dir()?.join(name))
}

/// Path of a file in the log directory, created on demand.
pub fn log_dir_file(name: &str) -> io::Result<PathBuf> {
    let dir = crate::log_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

/// Path of a bundled binary: `PROXYPILOT_BIN_DIR` if set, else the directory
/// of the running executable.
pub fn bin_dir_file(name: &str) -> io::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("PROXYPILOT_BIN_DIR") {
        return Ok(PathBuf::from(dir).join(name));
    }
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))?;
    Ok(dir.join(name))
}

fn asset_override(name: &str) -> Option<String> {
    let dir = std::env::var_os("PROXYPILOT_ASSETS_DIR")?;
    std::fs::read_to_string(PathBuf::from(dir).join(name)).ok()
}

/// PAC script template, embedded default or on-disk override.
pub fn pac_template() -> String {
    asset_override("proxy.pac").unwrap_or_else(|| PAC_TEMPLATE.to_string())
}

/// Filtering-helper config template, embedded default or on-disk override.
pub fn helper_config_template() -> String {
    asset_override("privoxy.conf").unwrap_or_else(|| HELPER_CONFIG_TEMPLATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_carry_placeholders() {
        let pac = pac_template();
        assert!(pac.contains("__PAC_SCRIPT_PLACEHOLDER_HOST__"));
        assert!(pac.contains("__PAC_SCRIPT_PLACEHOLDER_SOCKS__"));
        assert!(pac.contains("__PAC_SCRIPT_PLACEHOLDER_HTTP__"));

        let conf = helper_config_template();
        assert!(conf.contains("__PRIVOXY_BIND_IP__"));
        assert!(conf.contains("__PRIVOXY_BIND_PORT__"));
        assert!(conf.contains("__PRIVOXY_LOG_FILE__"));
        assert!(conf.contains("__SOCKS_HOST__"));
        assert!(conf.contains("__SOCKS_PORT__"));
    }

    #[test]
    fn tmp_dir_is_created() {
        let dir = tmp_dir().unwrap();
        assert!(dir.exists());
    }
}
