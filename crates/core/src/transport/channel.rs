//! Data channel capability and message payloads

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Maximum message size accepted for sending (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Transport-assigned channel identity, unique per transport instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload carried over a data channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ChannelMessage {
    /// UTF-8 text frame
    Text(String),
    /// Raw binary frame
    #[serde(with = "base64_bytes")]
    Binary(Bytes),
}

impl ChannelMessage {
    pub fn text(text: impl Into<String>) -> Self {
        ChannelMessage::Text(text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        ChannelMessage::Binary(data.into())
    }

    /// Text frame holding the JSON encoding of `value`
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(ChannelMessage::Text(serde_json::to_string(value)?))
    }

    /// Parse a text frame as JSON
    pub fn parse_json<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.as_text().and_then(|t| serde_json::from_str(t).ok())
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        match self {
            ChannelMessage::Text(t) => t.len(),
            ChannelMessage::Binary(b) => b.len(),
        }
    }

    pub fn exceeds_max_size(&self) -> bool {
        self.size() > MAX_MESSAGE_SIZE
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ChannelMessage::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelMessage::Text(t) => Some(t),
            ChannelMessage::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            ChannelMessage::Binary(b) => Some(b),
            ChannelMessage::Text(_) => None,
        }
    }
}

impl From<&str> for ChannelMessage {
    fn from(text: &str) -> Self {
        ChannelMessage::Text(text.to_string())
    }
}

impl From<String> for ChannelMessage {
    fn from(text: String) -> Self {
        ChannelMessage::Text(text)
    }
}

impl fmt::Display for ChannelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMessage::Text(t) => f.write_str(t),
            ChannelMessage::Binary(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Base64 encoding for binary payloads in JSON form
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(s)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// A bidirectional ordered message pipe owned by the transport
#[async_trait]
pub trait DataChannel: Send + Sync + fmt::Debug {
    fn id(&self) -> ChannelId;

    fn label(&self) -> &str;

    /// Whether the channel can currently carry messages
    fn is_open(&self) -> bool;

    async fn send(&self, message: &ChannelMessage) -> Result<()>;

    /// Close the channel; closing twice is a no-op
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_size() {
        assert_eq!(ChannelMessage::text("hello").size(), 5);
        assert_eq!(ChannelMessage::binary(vec![0u8; 3]).size(), 3);
        assert!(!ChannelMessage::text("x").exceeds_max_size());
        assert!(ChannelMessage::binary(vec![0u8; MAX_MESSAGE_SIZE + 1]).exceeds_max_size());
    }

    #[test]
    fn test_json_helpers() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Ping {
            seq: u32,
        }

        let msg = ChannelMessage::json(&Ping { seq: 7 }).unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.parse_json::<Ping>(), Some(Ping { seq: 7 }));
        assert_eq!(ChannelMessage::binary(vec![1]).parse_json::<Ping>(), None);
    }

    #[test]
    fn test_binary_serializes_as_base64() {
        let msg = ChannelMessage::binary(vec![1u8, 2, 3]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"binary","payload":"AQID"}"#);
        let back: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChannelMessage::from("hi").to_string(), "hi");
        assert_eq!(ChannelMessage::binary(vec![0u8; 4]).to_string(), "<4 bytes>");
        assert_eq!(ChannelId(3).to_string(), "#3");
    }
}
