//! In-memory host end for exercising a plugin channel in tests.
//!
//! Enabled with the `test-util` feature. Every method panics on I/O or
//! decode failure, which is what a failing test wants.

use mixbridge_frame::{InboundFrame, OutboundFrame};
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// The host side of an in-memory duplex channel.
pub struct FakeHost {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeHost {
    /// Returns the plugin end of a fresh duplex pipe and the host driving it.
    pub fn pair() -> (DuplexStream, FakeHost) {
        let (plugin, host) = tokio::io::duplex(DUPLEX_CAPACITY);
        (plugin, FakeHost::new(host))
    }

    pub fn new(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    /// Next raw line from the plugin, without the trailing newline.
    pub async fn next_line(&mut self) -> String {
        self.lines
            .next_line()
            .await
            .expect("read from plugin")
            .expect("plugin closed the channel")
    }

    pub async fn next_frame(&mut self) -> OutboundFrame {
        let line = self.next_line().await;
        let value = serde_json::from_str(&line).expect("plugin wrote JSON");
        OutboundFrame::from_value(value).expect("plugin wrote a frame")
    }

    pub async fn write(&mut self, frame: InboundFrame) {
        let mut line = serde_json::to_vec(&frame).expect("encode inbound frame");
        line.push(b'\n');
        self.write_raw(&line).await;
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to plugin");
    }

    /// Answer the next invoke on `channel` with `value`, returning the frames
    /// the plugin sent before it.
    pub async fn answer(&mut self, channel: &str, value: Value) -> Vec<OutboundFrame> {
        let mut before = Vec::new();
        loop {
            let frame = self.next_frame().await;
            if frame.channel == channel {
                let token = frame.reply_to.expect("invoke carries a token");
                self.write(InboundFrame::reply(&token, value)).await;
                return before;
            }
            before.push(frame);
        }
    }
}
