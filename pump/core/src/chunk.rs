//! Chunk Envelope
//!
//! The unit of data flowing through a pump. Sequence numbers are assigned
//! once, at the source, starting at 0. The terminal envelope carries the
//! next unused sequence number.
//!
//! Stages treat an envelope as an optional payload plus a terminal flag:
//! the payload is processed if present, then the terminal flag is honoured.
//! Aggregating stages may emit a terminal envelope that still carries a
//! payload (their final flush), and every downstream stage handles that.

use serde::{Deserialize, Serialize};

/// One unit of data in flight
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk<T> {
    /// Position of this envelope within its pump
    pub sequence: u64,
    /// The carried value (absent on a bare terminal envelope)
    pub payload: Option<T>,
    /// Whether this is the last envelope of the stream
    pub terminal: bool,
}

impl<T> Chunk<T> {
    /// A non-terminal envelope carrying `payload`
    #[must_use]
    pub fn item(sequence: u64, payload: T) -> Self {
        Self {
            sequence,
            payload: Some(payload),
            terminal: false,
        }
    }

    /// A bare terminal envelope
    #[must_use]
    pub fn terminal(sequence: u64) -> Self {
        Self {
            sequence,
            payload: None,
            terminal: true,
        }
    }

    /// A terminal envelope that flushes a final payload
    #[must_use]
    pub fn terminal_with(sequence: u64, payload: T) -> Self {
        Self {
            sequence,
            payload: Some(payload),
            terminal: true,
        }
    }

    /// Whether this envelope ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Borrow the payload, if any
    #[must_use]
    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Take the payload, discarding the envelope metadata
    #[must_use]
    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    /// Transform the payload, keeping sequence and terminal flag
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> Chunk<U> {
        Chunk {
            sequence: self.sequence,
            payload: self.payload.map(f),
            terminal: self.terminal,
        }
    }

    /// Replace the payload, keeping sequence and terminal flag
    pub fn with_payload<U>(self, payload: Option<U>) -> Chunk<U> {
        Chunk {
            sequence: self.sequence,
            payload,
            terminal: self.terminal,
        }
    }
}
