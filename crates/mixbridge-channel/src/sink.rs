use std::sync::{Arc, Mutex, PoisonError};

use mixbridge_frame::OutboundFrame;
use serde_json::Value;

use crate::error::Result;

/// Anything fire-and-forget frames can be written to.
///
/// [`crate::IpcChannel`] is the production implementation; [`MemorySink`]
/// records frames for tests and dry runs.
pub trait FrameSink: Clone + Send + Sync + 'static {
    fn send_frame(&self, frame: OutboundFrame) -> Result<()>;

    fn send(&self, channel: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.send_frame(OutboundFrame::event(channel, args))
    }
}

/// A sink that keeps every frame in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<OutboundFrame>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the frames sent so far.
    pub fn frames(&self) -> Vec<OutboundFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the frames sent so far.
    pub fn take(&self) -> Vec<OutboundFrame> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Frames sent on one channel.
    pub fn sent_on(&self, channel: &str) -> Vec<OutboundFrame> {
        self.frames()
            .into_iter()
            .filter(|frame| frame.channel == channel)
            .collect()
    }
}

impl FrameSink for MemorySink {
    fn send_frame(&self, frame: OutboundFrame) -> Result<()> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
        Ok(())
    }
}
