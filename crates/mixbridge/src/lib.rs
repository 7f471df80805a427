//! Plugin SDK for mixer hosts.
//!
//! A plugin registers [`Assignment`]s (mixer channel proxies) and
//! [`ButtonType`]s (generic buttons) with the host and receives hardware
//! events for them. When the plugin runs as a worker process, every call
//! travels over one multiplexed channel inherited from the host.
//!
//! ```no_run
//! use mixbridge::{Assignment, AssignmentData, AssignmentEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let Some(host) = mixbridge::install()? else {
//!         return Ok(());
//!     };
//!     let mut music = Assignment::new(&host, "music", AssignmentData::named("Music"))?;
//!     let mut events = music.subscribe();
//!     host.ready()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let AssignmentEvent::VolumeChanged(level) = event {
//!             music.set_volume(level)?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Crate Structure
//!
//! - [`transport`]: inherited channel descriptors, sockets, spawning plugins
//! - [`frame`]: newline-delimited JSON framing and topic names
//! - [`channel`]: send/invoke channel with correlated replies and events
//! - [`host`]: the host capability surface, indicator throttling, stats

mod assignment;
mod binding;
mod button_type;
pub mod error;

/// Re-export transport types.
pub mod transport {
    pub use mixbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mixbridge_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use mixbridge_channel::*;
}

/// Re-export host types.
pub mod host {
    pub use mixbridge_host::*;
}

pub use assignment::{Assignment, AssignmentEvent, METER_FALLOFF};
pub use binding::{install, install_with, installed};
pub use button_type::{ButtonType, ButtonTypeEvent};
pub use error::EntityError;
pub use mixbridge_frame::{Button, Indicator};
pub use mixbridge_host::{AssignmentData, ButtonTypeData, HostApi, HostConfig, HostError};
