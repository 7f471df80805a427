use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Frame terminator on the wire.
pub const DELIMITER: u8 = b'\n';

/// Default maximum frame size (excluding the delimiter): 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a value into the wire format.
///
/// Wire format: one compact JSON document followed by `\n`. Compact JSON
/// never contains a raw newline, so the delimiter is unambiguous.
pub fn encode_frame<T: Serialize + ?Sized>(value: &T, dst: &mut BytesMut) -> Result<usize> {
    let json = serde_json::to_vec(value)?;
    dst.reserve(json.len() + 1);
    dst.put_slice(&json);
    dst.put_u8(DELIMITER);
    Ok(json.len())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Blank lines are skipped. On success, consumes the frame bytes.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Value>> {
    let mut scanned = 0;
    decode_from(src, max_frame_size, &mut scanned)
}

fn decode_from(
    src: &mut BytesMut,
    max_frame_size: usize,
    scanned: &mut usize,
) -> Result<Option<Value>> {
    loop {
        let Some(offset) = src[*scanned..].iter().position(|b| *b == DELIMITER) else {
            *scanned = src.len();
            if src.len() > max_frame_size {
                let size = src.len();
                src.clear();
                *scanned = 0;
                return Err(FrameError::FrameTooLarge {
                    size,
                    max: max_frame_size,
                });
            }
            return Ok(None);
        };

        let end = *scanned + offset;
        *scanned = 0;
        let line = src.split_to(end + 1);
        let body = trim_line(&line[..end]);

        if body.len() > max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: body.len(),
                max: max_frame_size,
            });
        }
        if body.is_empty() {
            continue;
        }

        return serde_json::from_slice(body).map(Some).map_err(Into::into);
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// `tokio_util` codec for the plugin channel.
///
/// Decodes raw JSON values; callers validate the frame shape they expect
/// ([`crate::InboundFrame`] on the plugin side, [`crate::OutboundFrame`] on
/// the host side).
#[derive(Debug, Clone, Default)]
pub struct IpcCodec {
    config: FrameConfig,
    scanned: usize,
}

impl IpcCodec {
    /// Create a codec with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config, scanned: 0 }
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for IpcCodec {
    type Item = Value;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        decode_from(src, self.config.max_frame_size, &mut self.scanned)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if trim_line(src).is_empty() {
            src.clear();
            self.scanned = 0;
            return Ok(None);
        }
        src.advance(src.len());
        self.scanned = 0;
        Err(FrameError::ConnectionClosed)
    }
}

impl<T: Serialize> Encoder<T> for IpcCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        let size = encode_frame(&item, dst)?;
        if size > self.config.max_frame_size {
            dst.truncate(start);
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.config.max_frame_size,
            });
        }
        Ok(())
    }
}
