use std::borrow::Borrow;
use std::fmt;

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{FrameError, Result};

/// Opaque one-shot reply address for a request/response exchange.
///
/// Time-ordered and random (UUID v7), so tokens are unique for the lifetime of
/// the process. On the wire the host replies using the token as the topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyToken(String);

impl ReplyToken {
    /// Mint a fresh token.
    pub fn new() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Wrap a token received from the wire.
    pub fn from_wire(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ReplyToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Borrow<str> for ReplyToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plugin → host frame: `[channel, correlationId | null, args]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundFrame {
    pub channel: String,
    /// Set only when the sender expects a reply.
    pub reply_to: Option<ReplyToken>,
    pub args: Vec<Value>,
}

impl OutboundFrame {
    /// A fire-and-forget frame.
    pub fn event(channel: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            channel: channel.into(),
            reply_to: None,
            args,
        }
    }

    /// A frame expecting a reply addressed to `token`.
    pub fn request(channel: impl Into<String>, token: ReplyToken, args: Vec<Value>) -> Self {
        Self {
            channel: channel.into(),
            reply_to: Some(token),
            args,
        }
    }

    /// Validate a decoded value as an outbound frame (host side).
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(FrameError::Malformed("frame is not an array".to_string()));
        };
        let [channel, reply_to, args]: [Value; 3] = items.try_into().map_err(|items: Vec<Value>| {
            FrameError::Malformed(format!(
                "outbound frame has {} elements, expected 3",
                items.len()
            ))
        })?;

        let channel = non_empty_string(channel, "channel")?;
        let reply_to = match reply_to {
            Value::Null => None,
            Value::String(token) if !token.is_empty() => Some(ReplyToken::from_wire(token)),
            _ => {
                return Err(FrameError::Malformed(
                    "correlation id must be a non-empty string or null".to_string(),
                ))
            }
        };
        let Value::Array(args) = args else {
            return Err(FrameError::Malformed("args must be an array".to_string()));
        };

        Ok(Self {
            channel,
            reply_to,
            args,
        })
    }
}

impl Serialize for OutboundFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.channel)?;
        tuple.serialize_element(&self.reply_to.as_ref().map(ReplyToken::as_str))?;
        tuple.serialize_element(&self.args)?;
        tuple.end()
    }
}

/// Host → plugin frame: `[topic, args]`.
///
/// `topic` is either a broadcast topic or the reply token of a pending
/// request; the channel layer decides which.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub topic: String,
    pub args: Vec<Value>,
}

impl InboundFrame {
    pub fn new(topic: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            topic: topic.into(),
            args,
        }
    }

    /// A reply to the request addressed by `token`.
    pub fn reply(token: &ReplyToken, value: Value) -> Self {
        Self::new(token.as_str(), vec![value])
    }

    /// Validate a decoded value as an inbound frame.
    ///
    /// Accepts a 1- or 2-element array whose first element is a non-empty
    /// string; the second element, when present, must be an array.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(FrameError::Malformed("frame is not an array".to_string()));
        };
        if items.is_empty() || items.len() > 2 {
            return Err(FrameError::Malformed(format!(
                "inbound frame has {} elements, expected 1 or 2",
                items.len()
            )));
        }

        let mut items = items.into_iter();
        let topic = non_empty_string(items.next().unwrap_or(Value::Null), "topic")?;
        let args = match items.next() {
            None => Vec::new(),
            Some(Value::Array(args)) => args,
            Some(_) => return Err(FrameError::Malformed("args must be an array".to_string())),
        };

        Ok(Self { topic, args })
    }

    /// The first argument, or `null` when there is none.
    pub fn first_arg(&self) -> Value {
        self.args.first().cloned().unwrap_or(Value::Null)
    }
}

impl Serialize for InboundFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.topic)?;
        tuple.serialize_element(&self.args)?;
        tuple.end()
    }
}

fn non_empty_string(value: Value, what: &str) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::String(_) => Err(FrameError::Malformed(format!("{what} is empty"))),
        _ => Err(FrameError::Malformed(format!("{what} is not a string"))),
    }
}
