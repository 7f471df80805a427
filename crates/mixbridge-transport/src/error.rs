use std::path::PathBuf;

/// Errors that can occur while opening or driving the IPC stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel fd environment variable is set but unusable.
    #[error("invalid channel fd in {var}={value:?}: {reason}")]
    InvalidChannelFd {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Failed to connect to the specified socket path.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to spawn a plugin process with an attached channel.
    #[error("failed to spawn plugin process: {0}")]
    Spawn(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// This platform has no channel implementation.
    #[error("IPC channels are not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, TransportError>;
