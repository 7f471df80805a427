//! Duplex IPC stream between a mixer host and a plugin worker process.
//!
//! This is the lowest layer of mixbridge. The worker side adopts the channel
//! descriptor it inherited from the host; the host side (and the `mixbridge
//! host` development tool) spawns plugins with a channel attached.

pub mod env;
pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod spawn;

pub use env::{ProcessKind, CHANNEL_FD_ENV, NODE_CHANNEL_FD_ENV};
pub use error::{Result, TransportError};
pub use stream::IpcStream;

#[cfg(unix)]
pub use spawn::{spawn_with_channel, CHILD_CHANNEL_FD};

/// Open the channel for a detected worker process.
#[cfg(unix)]
pub fn open_worker_channel(kind: ProcessKind) -> Result<Option<IpcStream>> {
    match kind {
        ProcessKind::Worker { fd } => IpcStream::from_inherited_fd(fd).map(Some),
        ProcessKind::Embedded => Ok(None),
    }
}

/// Open the channel for a detected worker process.
#[cfg(not(unix))]
pub fn open_worker_channel(kind: ProcessKind) -> Result<Option<IpcStream>> {
    match kind {
        ProcessKind::Worker { .. } => Err(TransportError::Unsupported),
        ProcessKind::Embedded => Ok(None),
    }
}
