use std::os::fd::{AsRawFd, RawFd};

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::env::{CHANNEL_FD_ENV, NODE_CHANNEL_FD_ENV};
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Descriptor number the channel occupies inside the spawned plugin.
pub const CHILD_CHANNEL_FD: RawFd = 3;

/// Spawn a plugin process with an attached IPC channel.
///
/// The plugin end of a socket pair is installed as fd [`CHILD_CHANNEL_FD`] in
/// the child and advertised through both channel fd variables. The host end
/// is returned alongside the child handle.
pub fn spawn_with_channel(mut command: Command) -> Result<(Child, IpcStream)> {
    let (host_end, plugin_end) = std::os::unix::net::UnixStream::pair()?;
    let plugin_fd = plugin_end.as_raw_fd();

    command
        .env(CHANNEL_FD_ENV, CHILD_CHANNEL_FD.to_string())
        .env(NODE_CHANNEL_FD_ENV, CHILD_CHANNEL_FD.to_string())
        .kill_on_drop(true);

    // SAFETY: the closure only calls async-signal-safe libc functions.
    unsafe {
        command.pre_exec(move || install_channel_fd(plugin_fd));
    }

    let child = command.spawn().map_err(TransportError::Spawn)?;
    drop(plugin_end);

    info!(pid = child.id(), "spawned plugin process");
    let stream = IpcStream::from_std_unix(host_end)?;
    debug!("host end of plugin channel ready");
    Ok((child, stream))
}

fn install_channel_fd(fd: RawFd) -> std::io::Result<()> {
    if fd == CHILD_CHANNEL_FD {
        // dup2 onto itself keeps FD_CLOEXEC, so clear it explicitly.
        // SAFETY: plain fcntl on a descriptor we own in the forked child.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags == -1 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: as above.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
        return Ok(());
    }

    // SAFETY: dup2 onto a fixed descriptor number in the forked child.
    if unsafe { libc::dup2(fd, CHILD_CHANNEL_FD) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
