//! Framing and vocabulary for the mixer plugin channel.
//!
//! Every message is one compact JSON array terminated by `\n`:
//! - plugin → host: `[channel, correlationId | null, args]`
//! - host → plugin: `[topic, args]`, where a reply uses the correlation id as
//!   its topic
//!
//! The [`IpcCodec`] plugs into `tokio_util::codec` framed readers and writers.

pub mod codec;
pub mod error;
pub mod frame;
pub mod topic;

pub use codec::{
    decode_frame, encode_frame, FrameConfig, IpcCodec, DEFAULT_MAX_FRAME_SIZE, DELIMITER,
};
pub use error::{FrameError, Result};
pub use frame::{InboundFrame, OutboundFrame, ReplyToken};
pub use topic::{Button, Channel, Indicator, Topic, CHANNEL_PREFIX};
