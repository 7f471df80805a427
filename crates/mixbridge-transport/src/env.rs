//! Process-type detection.
//!
//! A plugin launched by the host as a detached worker inherits the channel as
//! an open descriptor whose number is published in the environment.

use crate::error::{Result, TransportError};

/// Environment variable carrying the inherited channel fd.
pub const CHANNEL_FD_ENV: &str = "MIXBRIDGE_CHANNEL_FD";

/// Fallback variable set by hosts that launch plugins as Node.js children.
pub const NODE_CHANNEL_FD_ENV: &str = "NODE_CHANNEL_FD";

/// How the current process relates to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// Detached worker: all host calls go over the inherited channel.
    Worker { fd: i32 },
    /// No channel was handed over; the plugin runs inside the host.
    Embedded,
}

impl ProcessKind {
    /// Detect the process kind from the real environment.
    pub fn detect() -> Result<Self> {
        Self::detect_with(|key| std::env::var(key).ok())
    }

    /// Detect the process kind using an arbitrary variable lookup.
    pub fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for var in [CHANNEL_FD_ENV, NODE_CHANNEL_FD_ENV] {
            let Some(value) = lookup(var) else {
                continue;
            };
            let fd = value
                .trim()
                .parse::<i32>()
                .map_err(|err| TransportError::InvalidChannelFd {
                    var,
                    value: value.clone(),
                    reason: err.to_string(),
                })?;
            if fd < 0 {
                return Err(TransportError::InvalidChannelFd {
                    var,
                    value,
                    reason: "descriptor must be non-negative".to_string(),
                });
            }
            return Ok(Self::Worker { fd });
        }
        Ok(Self::Embedded)
    }

    /// Returns true for a detached worker process.
    pub fn is_worker(&self) -> bool {
        matches!(self, Self::Worker { .. })
    }
}
