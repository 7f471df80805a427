use std::fmt;
use std::io;

use mixbridge::channel::ChannelError;
use mixbridge::frame::FrameError;
use mixbridge::transport::TransportError;
use mixbridge::{EntityError, HostError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::Spawn(source) if source.kind() == io::ErrorKind::NotFound => {
            CliError::new(USAGE, format!("{context}: {source}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Json(_) | FrameError::Malformed(_) | FrameError::FrameTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Frame(err) | ChannelError::Protocol(err) => frame_error(context, err),
        ChannelError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ChannelError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn host_error(context: &str, err: HostError) -> CliError {
    match err {
        HostError::Channel(err) => channel_error(context, err),
        HostError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn entity_error(context: &str, err: EntityError) -> CliError {
    match err {
        EntityError::Host(err) => host_error(context, err),
        other => CliError::new(USAGE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = host_error(
            "get settings",
            HostError::Channel(ChannelError::Timeout(Duration::from_secs(5))),
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("get settings: "));
    }

    #[test]
    fn malformed_frames_are_data_errors() {
        let err = channel_error(
            "read",
            ChannelError::Protocol(FrameError::Malformed("not an array".into())),
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_program_is_usage_error() {
        let err = transport_error(
            "spawn",
            TransportError::Spawn(io::Error::from(io::ErrorKind::NotFound)),
        );
        assert_eq!(err.code, USAGE);
    }
}
