//! Source Adapter
//!
//! Converts any external producer into a pump. Each produced value becomes a
//! non-terminal envelope (sequence 0, 1, 2, ...), followed by exactly one
//! terminal envelope carrying the next unused sequence number.
//!
//! A producer failure ends the stream with [`PumpError::Source`] and no
//! terminal envelope follows it.
//!
//! # Cancellation
//!
//! A [`CancellationToken`] can be threaded from the consumer back to the
//! source. Every pull races the token; once it fires the producer is dropped
//! (releasing whatever it holds, e.g. an open HTTP body) and the stream ends
//! with [`PumpError::Cancelled`]. Simply dropping the pump releases the
//! producer too.

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{PumpError, Result};
use crate::pump::Pump;

/// Builder for a pump over an external producer
pub struct Source<T> {
    producer: BoxStream<'static, anyhow::Result<T>>,
    cancel: Option<CancellationToken>,
}

impl<T: Send + 'static> Source<T> {
    /// Adapt an infallible producer
    pub fn new<S>(producer: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            producer: producer.map(Ok).boxed(),
            cancel: None,
        }
    }

    /// Adapt a producer whose pulls may fail
    pub fn fallible<S, E>(producer: S) -> Self
    where
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self {
            producer: producer.map_err(Into::into).boxed(),
            cancel: None,
        }
    }

    /// Stop pulling (and drop the producer) once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start the pump
    pub fn into_pump(self) -> Pump<T> {
        let state = SourceState {
            producer: self.producer,
            cancel: self.cancel,
            next_sequence: 0,
        };
        Pump::from_stage(stream::unfold(Some(state), pull))
    }
}

struct SourceState<T> {
    producer: BoxStream<'static, anyhow::Result<T>>,
    cancel: Option<CancellationToken>,
    next_sequence: u64,
}

enum Pulled<T> {
    Value(anyhow::Result<T>),
    Exhausted,
    Cancelled,
}

async fn pull<T>(
    state: Option<SourceState<T>>,
) -> Option<(Result<Chunk<T>>, Option<SourceState<T>>)> {
    let mut state = state?;

    let pulled = match &state.cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Pulled::Cancelled,
            item = state.producer.next() => item.map_or(Pulled::Exhausted, Pulled::Value),
        },
        None => state
            .producer
            .next()
            .await
            .map_or(Pulled::Exhausted, Pulled::Value),
    };

    match pulled {
        Pulled::Value(Ok(value)) => {
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            Some((Ok(Chunk::item(sequence, value)), Some(state)))
        }
        Pulled::Value(Err(err)) => {
            debug!(error = %err, sequence = state.next_sequence, "source failed");
            Some((Err(PumpError::producer(err)), None))
        }
        Pulled::Exhausted => {
            debug!(sequence = state.next_sequence, "source exhausted");
            Some((Ok(Chunk::terminal(state.next_sequence)), None))
        }
        Pulled::Cancelled => {
            debug!(sequence = state.next_sequence, "source cancelled");
            Some((Err(PumpError::Cancelled), None))
        }
    }
}

impl<T: Send + 'static> Pump<T> {
    /// Pump over the values of an iterator (finite or unbounded)
    pub fn iter<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Source::new(stream::iter(values)).into_pump()
    }

    /// Pump over an async producer
    pub fn from_stream<S>(producer: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Source::new(producer).into_pump()
    }

    /// Pump over an async producer whose pulls may fail
    pub fn from_try_stream<S, E>(producer: S) -> Self
    where
        S: Stream<Item = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Source::fallible(producer).into_pump()
    }

    /// Pump over a channel fed by another task
    ///
    /// The stream ends once every sender has been dropped.
    pub fn from_receiver(receiver: mpsc::Receiver<T>) -> Self {
        Source::new(ReceiverStream::new(receiver)).into_pump()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_sequences_and_terminal() {
        let chunks: Vec<_> = Pump::iter(vec!["a", "b", "c"])
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![
                Chunk::item(0, "a"),
                Chunk::item(1, "b"),
                Chunk::item(2, "c"),
                Chunk::terminal(3),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_source_emits_only_terminal() {
        let chunks: Vec<_> = Pump::iter(Vec::<u8>::new()).into_stream().collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &Chunk::terminal(0));
    }

    #[tokio::test]
    async fn test_source_failure_ends_without_terminal() {
        let producer = stream::iter(vec![Ok(1), Err(anyhow::anyhow!("socket closed")), Ok(3)]);
        let mut stream = Pump::from_try_stream(producer).into_stream();

        assert_eq!(stream.next().await.unwrap().unwrap(), Chunk::item(0, 1));
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, PumpError::Source(_)));
        assert_eq!(err.to_string(), "source failed: socket closed");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unbounded_source_is_lazy() {
        let first: Vec<_> = Pump::iter(0u64..)
            .into_stream()
            .take(3)
            .map(|item| item.unwrap().payload)
            .collect()
            .await;
        assert_eq!(first, vec![Some(0), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_receiver_source() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for word in ["Hello", "world"] {
                tx.send(word.to_string()).await.unwrap();
            }
        });

        let words = Pump::from_receiver(rx).collect_payloads().await.unwrap();
        assert_eq!(words, vec!["Hello", "world"]);
    }

    /// Producer that records when it is dropped
    struct Tracked {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_cancellation_releases_pending_producer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = Tracked {
            dropped: Arc::clone(&dropped),
        };
        // Yields one value, then never resolves
        let producer = stream::once(async { 1 }).chain(stream::pending()).map(move |v| {
            let _held = &guard;
            v
        });

        let token = CancellationToken::new();
        let mut stream = Source::new(producer)
            .with_cancellation(token.clone())
            .into_pump()
            .into_stream();

        assert_eq!(stream.next().await.unwrap().unwrap(), Chunk::item(0, 1));
        assert!(!dropped.load(Ordering::SeqCst));

        let consumer = tokio::spawn(async move {
            let next = stream.next().await;
            (next, stream.next().await.is_none())
        });
        token.cancel();

        let (next, ended) = consumer.await.unwrap();
        assert!(next.unwrap().unwrap_err().is_cancelled());
        assert!(ended);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_already_cancelled_source_yields_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let result = Source::new(stream::iter(vec![1, 2]))
            .with_cancellation(token)
            .into_pump()
            .collect_payloads()
            .await;
        assert!(matches!(result, Err(PumpError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropping_pump_releases_producer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = Tracked {
            dropped: Arc::clone(&dropped),
        };
        let producer = stream::iter(0..).map(move |v| {
            let _held = &guard;
            v
        });

        let mut pump = Pump::from_stream(producer);
        assert!(pump.next().await.is_some());
        drop(pump);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
