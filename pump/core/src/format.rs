//! Wire Formats
//!
//! Encodes payloads into the byte framing expected by the transport that
//! ends up reading the pump. The encoder is picked once when the chain is
//! composed; no per-payload dispatch happens afterwards.
//!
//! | Format   | Payload framing          | Terminal           |
//! |----------|--------------------------|--------------------|
//! | `text`   | `<text>\n`               | nothing            |
//! | `ndjson` | `<json>\n`               | nothing            |
//! | `sse`    | `data: <json>\n\n`       | `event: done` frame |

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::PumpError;
use crate::pump::Pump;

/// Frame sent after the last SSE event
pub const SSE_DONE: &[u8] = b"event: done\ndata: [DONE]\n\n";

/// Encodes one payload
pub type Encoder<T> = fn(&T) -> anyhow::Result<Bytes>;

/// Output framing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Plain lines; strings are written as-is, anything else as JSON
    #[default]
    Text,
    /// One JSON document per line
    NdJson,
    /// Server-sent events
    Sse,
}

impl Format {
    /// Resolve the payload encoder for this format
    #[must_use]
    pub fn encoder<T: Serialize>(self) -> Encoder<T> {
        match self {
            Self::Text => encode_text::<T>,
            Self::NdJson => encode_ndjson::<T>,
            Self::Sse => encode_sse::<T>,
        }
    }

    /// Bytes appended once the stream has ended
    #[must_use]
    pub fn trailer(self) -> Option<&'static [u8]> {
        match self {
            Self::Sse => Some(SSE_DONE),
            Self::Text | Self::NdJson => None,
        }
    }

    /// MIME type a transport should advertise
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::NdJson => "application/x-ndjson",
            Self::Sse => "text/event-stream",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::NdJson => write!(f, "ndjson"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "ndjson" | "jsonl" => Ok(Self::NdJson),
            "sse" => Ok(Self::Sse),
            other => Err(format!("Unknown output format: {other}")),
        }
    }
}

fn encode_text<T: Serialize>(payload: &T) -> anyhow::Result<Bytes> {
    let mut line = match serde_json::to_value(payload)? {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    };
    line.push('\n');
    Ok(Bytes::from(line))
}

fn encode_ndjson<T: Serialize>(payload: &T) -> anyhow::Result<Bytes> {
    let mut line = serde_json::to_vec(payload)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

fn encode_sse<T: Serialize>(payload: &T) -> anyhow::Result<Bytes> {
    let json = serde_json::to_vec(payload)?;
    let mut frame = BytesMut::with_capacity(json.len() + 8);
    frame.put_slice(b"data: ");
    frame.put_slice(&json);
    frame.put_slice(b"\n\n");
    Ok(frame.freeze())
}

fn encode_chunk<T>(
    chunk: Chunk<T>,
    encode: Encoder<T>,
    trailer: Option<&'static [u8]>,
) -> anyhow::Result<Chunk<Bytes>> {
    let mut bytes = match &chunk.payload {
        Some(payload) => Some(encode(payload)?),
        None => None,
    };

    if chunk.terminal {
        if let Some(trailer) = trailer {
            let mut frame = BytesMut::new();
            if let Some(body) = bytes.take() {
                frame.put(body);
            }
            frame.put_slice(trailer);
            bytes = Some(frame.freeze());
        }
    }

    Ok(chunk.with_payload(bytes))
}

impl<T: Serialize + Send + 'static> Pump<T> {
    /// Encode every payload into `format`'s framing
    ///
    /// Serialization failures abort the chain as `encode` stage failures.
    pub fn encode(self, format: Format) -> Pump<Bytes> {
        let encode = format.encoder::<T>();
        let trailer = format.trailer();
        Pump::from_stage(self.into_stream().map(move |item| {
            let chunk = item?;
            encode_chunk(chunk, encode, trailer).map_err(|err| PumpError::operator("encode", err))
        }))
    }
}
