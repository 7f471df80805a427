use std::time::Duration;

/// Errors that can occur on the plugin channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] mixbridge_transport::TransportError),

    /// Frame-level error while reading or writing the stream.
    #[error("frame error: {0}")]
    Frame(#[from] mixbridge_frame::FrameError),

    /// The host sent a frame that violates the protocol.
    #[error("protocol violation: {0}")]
    Protocol(mixbridge_frame::FrameError),

    /// No reply arrived within the invoke timeout.
    #[error("timed out after {0:?} waiting for a reply from the host")]
    Timeout(Duration),

    /// The channel is closed; nothing more can be sent or received.
    #[error("channel closed")]
    Closed,

    /// A channel task panicked or was cancelled.
    #[error("channel task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
