//! Pump Core - Lazy, Composable Stream Pipelines for Model Output
//!
//! This crate turns the token-by-token output of a language model into units
//! downstream consumers can act on: sentences, speakable chunks, batches,
//! and framed bytes for an HTTP response. Nothing happens until the end of
//! the chain asks for data; every stage pulls from its upstream only when
//! its own downstream pulls from it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────────┐   ┌──────────────┐
//! │   Producer   │   │        Operator stages        │   │     Sink     │
//! │ (model, rx,  │──▶│ map · filter · tap · bundle · │──▶│ drain ·      │
//! │  iterator)   │   │ batch · buffer · encode       │   │ drain_to     │
//! └──────────────┘   └───────────────┬───────────────┘   └──────────────┘
//!        ▲                           │ fork
//!        │                           ▼
//!  CancellationToken          ┌─────────────┐
//!                             │  branch A   │  branch B
//!                             └─────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Pump`]: owned handle over one stream of [`Chunk`] envelopes
//! - [`Source`]: adapts a producer, with optional cancellation
//! - [`Sink`]: terminal write/close contract used by [`Pump::drain_to`]
//! - [`PumpError`]: source, operator and sink failures
//! - [`PipelineConfig`]: settings for assembled pipelines
//!
//! # Quick Start
//!
//! ```ignore
//! use pump_core::{ChannelSink, Format, Pump};
//!
//! let (body, handle) = Pump::from_receiver(tokens)
//!     .sentences()
//!     .encode(Format::Sse)
//!     .drain_to(ChannelSink::new(16));
//!
//! // Hand `body` to the HTTP layer right away
//! respond_with_stream(body);
//! handle.wait().await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod fork;
pub mod format;
mod pump;
pub mod sink;
pub mod source;
mod stage;
pub mod text;

pub use chunk::Chunk;
pub use error::{PumpError, Result, SharedError};
pub use fork::ForkOptions;
pub use format::Format;
pub use pump::{ChunkStream, DrainReport, Pump};
pub use sink::{ChannelSink, DrainHandle, Sink, WriterSink};
pub use source::Source;
pub use text::Segmentation;

// Config exports
pub use config::{
    default_config_path, load_config_from_path, load_config_with_env,
    ConfigError, ConfigOverrides, ConfigSource, PipelineConfig, PumpToml,
};

// Re-exported so callers can cancel a source without a direct dependency
pub use tokio_util::sync::CancellationToken;
