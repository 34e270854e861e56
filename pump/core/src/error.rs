//! Pipeline Errors
//!
//! Failures are grouped by where they originate:
//! - **Source**: the external producer failed to yield its next value
//! - **Operator**: a user-supplied transform, predicate or callback failed
//! - **Sink**: the terminal write or close failed
//!
//! Source and operator failures abort the whole chain. No terminal envelope
//! is synthesized after a failure; downstream stages observe the error
//! instead of a clean end.

use std::sync::Arc;

use thiserror::Error;

/// Shared, cloneable error source
///
/// Fork duplicates every envelope (and every failure) to both branches,
/// so the underlying cause must be shareable.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a pump while it is being pulled or drained
#[derive(Clone, Debug, Error)]
pub enum PumpError {
    /// The external producer failed
    #[error("source failed: {0}")]
    Source(#[source] SharedError),

    /// A user-supplied callback failed inside a stage
    #[error("{stage} stage failed: {source}")]
    Operator {
        /// Name of the stage that invoked the callback
        stage: &'static str,
        /// The callback's error
        #[source]
        source: SharedError,
    },

    /// The sink rejected a write or failed to close
    #[error("sink failed: {0}")]
    Sink(#[source] SharedError),

    /// The source was cancelled before it reached its end
    #[error("stream cancelled")]
    Cancelled,

    /// The spawned drain task panicked or was aborted
    #[error("drain task failed: {0}")]
    Join(String),
}

impl PumpError {
    /// Wrap a producer failure
    pub fn producer(err: impl Into<anyhow::Error>) -> Self {
        Self::Source(share(err.into()))
    }

    /// Wrap a callback failure raised inside `stage`
    pub fn operator(stage: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::Operator {
            stage,
            source: share(err.into()),
        }
    }

    /// Wrap a sink failure
    pub fn sink(err: impl Into<anyhow::Error>) -> Self {
        Self::Sink(share(err.into()))
    }

    /// Whether this error came from cancellation rather than a failure
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn share(err: anyhow::Error) -> SharedError {
    let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

/// Convenience alias used by stages and sinks
pub type Result<T, E = PumpError> = std::result::Result<T, E>;
