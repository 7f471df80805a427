#[cfg(unix)]
use std::path::Path;

use mixbridge_transport::{open_worker_channel, IpcStream, ProcessKind};
use tracing::{debug, info};

use crate::channel::{ChannelConfig, ChannelTasks, IpcChannel};
use crate::error::Result;

/// Open the channel this process inherited from its host.
///
/// Returns `Ok(None)` when the process was not started as a plugin worker.
pub fn open_worker(config: ChannelConfig) -> Result<Option<(IpcChannel, ChannelTasks)>> {
    open_worker_with(ProcessKind::detect()?, config)
}

/// The raw stream this process inherited from its host, if any.
///
/// Must be called from within a Tokio runtime.
pub fn worker_stream() -> Result<Option<IpcStream>> {
    Ok(open_worker_channel(ProcessKind::detect()?)?)
}

/// Open the channel for an explicitly detected process kind.
pub fn open_worker_with(
    kind: ProcessKind,
    config: ChannelConfig,
) -> Result<Option<(IpcChannel, ChannelTasks)>> {
    match open_worker_channel(kind)? {
        Some(stream) => {
            info!(?kind, "attached to host channel");
            Ok(Some(IpcChannel::open(stream, config)))
        }
        None => {
            debug!("not running as a plugin worker");
            Ok(None)
        }
    }
}

/// Connect to a host listening on a Unix domain socket.
#[cfg(unix)]
pub async fn connect(
    path: impl AsRef<Path>,
    config: ChannelConfig,
) -> Result<(IpcChannel, ChannelTasks)> {
    let stream = IpcStream::connect(path).await?;
    Ok(IpcChannel::open(stream, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_process_has_no_channel() {
        let opened = open_worker_with(ProcessKind::Embedded, ChannelConfig::default()).unwrap();
        assert!(opened.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_inherited_fd_is_an_error() {
        let err = open_worker_with(ProcessKind::Worker { fd: -1 }, ChannelConfig::default())
            .unwrap_err();
        assert!(matches!(err, crate::ChannelError::Transport(_)));
    }
}
