//! Process restart
//!
//! The default restart hook re-executes the running binary with its
//! startup arguments. If exec fails there is nothing left to fall back
//! on, so the process exits.

use std::convert::Infallible;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;

use nix::unistd::execv;

use kevloop_core::{kerror, Process};

/// Log `reason` and replace the process image with a fresh copy of
/// itself. Exits with status 1 if that is not possible.
pub fn exec_restart(reason: &str) -> ! {
    kerror!(System: "Restarting server: {}", reason);
    let Err(e) = reexec();
    kerror!(System: "Unable to restart: {}", e);
    std::process::exit(1)
}

fn reexec() -> io::Result<Infallible> {
    let exe = std::env::current_exe()?;
    let path = CString::new(exe.as_os_str().as_bytes())?;
    let args = std::env::args_os()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    execv(&path, args.as_slice()).map_err(io::Error::from)
}

/// Running process whose restart hook is [`exec_restart`].
pub fn default_process() -> Process {
    Process::new(Box::new(|reason| exec_restart(reason)))
}
