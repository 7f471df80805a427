/// Errors raised by the host capability surface.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("channel error: {0}")]
    Channel(#[from] mixbridge_channel::ChannelError),

    /// An indicator was set on an entity that is not registered.
    #[error("entity {0:?} is not registered; update it before setting indicators")]
    UnknownEntity(String),

    /// The host API was used outside a Tokio runtime.
    #[error("no Tokio runtime is available")]
    NoRuntime,

    #[error("invalid host data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
