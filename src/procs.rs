//! External process helpers.
//!
//! The supervised processes (upstream client, filtering helper) are launched
//! detached and torn down by name only; no handle is kept beyond the pid
//! reported at launch.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Spawn `bin` with `args`, detached from our lifetime: stdio is dropped and
/// no console window is created on Windows. The returned child handle can be
/// discarded; teardown goes through [`kill_process_by_name`].
pub(crate) fn spawn_detached(bin: &Path, args: &[&str]) -> io::Result<std::process::Child> {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.spawn()
}

/// Terminate every process matching `name`. No-op when none is running.
pub(crate) fn kill_process_by_name(name: &str) {
    #[cfg(target_os = "windows")]
    {
        let _ = Command::new("taskkill")
            .args(["/IM", name, "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    #[cfg(not(target_os = "windows"))]
    {
        // -f matches the full command line; the bare process name is
        // truncated to 15 chars in the kernel's comm field.
        let _ = Command::new("pkill")
            .args(["-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}
