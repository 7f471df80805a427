//! Plugin side of the mixer host channel.
//!
//! [`IpcChannel`] multiplexes fire-and-forget sends, request/response
//! invocations correlated by reply token, and host broadcast events over one
//! framed stream.
//!
//! ```no_run
//! # async fn demo() -> mixbridge_channel::Result<()> {
//! use mixbridge_channel::{open_worker, ChannelConfig};
//!
//! if let Some((channel, tasks)) = open_worker(ChannelConfig::default())? {
//!     let settings = channel.invoke("plugin-getSettings", vec![]).await?;
//!     println!("{settings}");
//!     channel.send("plugin-ready", vec![])?;
//!     tasks.closed().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod connector;
pub mod error;
pub mod events;
mod pending;
pub mod sink;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use channel::{
    ChannelConfig, ChannelStarter, ChannelTasks, Dispatch, IpcChannel, WeakChannel,
    DEFAULT_INVOKE_TIMEOUT,
};
#[cfg(unix)]
pub use connector::connect;
pub use connector::{open_worker, open_worker_with, worker_stream};
pub use error::{ChannelError, Result};
pub use events::{EventBus, Handler, ListenerId};
pub use sink::{FrameSink, MemorySink};
