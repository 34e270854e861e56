//! Pump Handle
//!
//! A [`Pump`] owns exactly one lazy, pull-based stream of [`Chunk`]s. Every
//! operator consumes the pump it is called on and returns a new one wrapping
//! the derived stream, so ownership moves forward through the chain and a
//! stream can never be traversed twice (except through [`Pump::fork`]).
//!
//! # Example
//!
//! ```ignore
//! use pump_core::Pump;
//!
//! let sentences = Pump::iter(vec!["Hi", " there.", " Bye", "!"])
//!     .map(str::to_string)
//!     .sentences()
//!     .collect_payloads()
//!     .await?;
//! assert_eq!(sentences, vec!["Hi there.", "Bye!"]);
//! ```

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::stream::{BoxStream, FusedStream};
use futures::{Future, Stream, StreamExt};
use pin_project_lite::pin_project;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::stage;

/// The stream type every pump wraps
pub type ChunkStream<T> = BoxStream<'static, Result<Chunk<T>>>;

pin_project! {
    /// Ends a stage's output after its first terminal envelope or failure
    ///
    /// The inner stream is dropped at that point, which releases everything
    /// upstream of it (including the producer) without waiting for the pump
    /// itself to be dropped.
    struct Sealed<S> {
        #[pin]
        inner: Option<S>,
    }
}

impl<S> Sealed<S> {
    fn new(inner: S) -> Self {
        Self { inner: Some(inner) }
    }
}

impl<S, T> Stream for Sealed<S>
where
    S: Stream<Item = Result<Chunk<T>>>,
{
    type Item = Result<Chunk<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        let Some(inner) = this.inner.as_mut().as_pin_mut() else {
            return Poll::Ready(None);
        };

        let item = ready!(inner.poll_next(cx));
        let finished = match &item {
            Some(Ok(chunk)) => chunk.is_terminal(),
            Some(Err(_)) | None => true,
        };
        if finished {
            this.inner.set(None);
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) => (0, inner.size_hint().1),
            None => (0, Some(0)),
        }
    }
}

impl<S, T> FusedStream for Sealed<S>
where
    S: Stream<Item = Result<Chunk<T>>>,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

/// Summary of a completed drain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Envelopes observed, terminal included
    pub chunks: u64,
    /// Envelopes that carried a payload
    pub payloads: u64,
    /// Sequence number of the last envelope observed
    pub last_sequence: Option<u64>,
}

impl DrainReport {
    pub(crate) fn record<T>(&mut self, chunk: &Chunk<T>) {
        self.chunks += 1;
        if chunk.payload.is_some() {
            self.payloads += 1;
        }
        self.last_sequence = Some(chunk.sequence);
    }
}

/// An immutable handle over one stream of chunk envelopes
#[must_use = "a pump does nothing until it is pulled or drained"]
pub struct Pump<T> {
    stream: ChunkStream<T>,
}

impl<T> std::fmt::Debug for Pump<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Pump<T> {
    /// Wrap a stage's output, sealing it after terminal or failure
    pub(crate) fn from_stage<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Chunk<T>>> + Send + 'static,
    {
        Self {
            stream: Box::pin(Sealed::new(stream)),
        }
    }

    /// Hand the underlying stream to the caller
    ///
    /// The stream yields nothing further once its terminal envelope (or a
    /// failure) has been observed.
    pub fn into_stream(self) -> ChunkStream<T> {
        self.stream
    }

    /// Apply `f` to every payload
    pub fn map<U, F>(self, f: F) -> Pump<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Pump::from_stage(stage::map(self.stream, f))
    }

    /// Apply a fallible `f` to every payload
    pub fn try_map<U, F>(self, f: F) -> Pump<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> anyhow::Result<U> + Send + 'static,
    {
        Pump::from_stage(stage::try_map(self.stream, f))
    }

    /// Apply an async, fallible `f` to every payload
    ///
    /// The stage suspends while the returned future is pending.
    pub fn map_async<U, F, Fut>(self, f: F) -> Pump<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
    {
        Pump::from_stage(stage::map_async(self.stream, f))
    }

    /// Keep payloads for which `predicate` holds
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Self::from_stage(stage::filter(self.stream, predicate))
    }

    /// Keep payloads for which a fallible `predicate` holds
    pub fn try_filter<P>(self, predicate: P) -> Self
    where
        P: FnMut(&T) -> anyhow::Result<bool> + Send + 'static,
    {
        Self::from_stage(stage::try_filter(self.stream, predicate))
    }

    /// Observe every envelope, terminal included
    pub fn tap<F>(self, f: F) -> Self
    where
        F: FnMut(&Chunk<T>) + Send + 'static,
    {
        Self::from_stage(stage::tap(self.stream, f))
    }

    /// Observe every envelope with a fallible callback
    pub fn on_chunk<F>(self, f: F) -> Self
    where
        F: FnMut(&Chunk<T>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::from_stage(stage::on_chunk(self.stream, f))
    }

    /// Group payloads into fixed-size batches
    pub fn batch(self, size: usize) -> Pump<Vec<T>> {
        Pump::from_stage(stage::batch(self.stream, size))
    }

    /// Group payloads until `close(item, bundle)` returns true
    ///
    /// The item that triggers closure is included in the emitted bundle.
    pub fn bundle<C>(self, close: C) -> Pump<Vec<T>>
    where
        C: FnMut(&T, &[T]) -> bool + Send + 'static,
    {
        Pump::from_stage(stage::bundle(self.stream, close))
    }

    /// Hold the first `size` envelopes and release them as one burst
    pub fn buffer(self, size: usize) -> Self {
        Self::from_stage(stage::buffer(self.stream, size))
    }

    /// Pull the stream to completion, discarding payloads
    ///
    /// # Errors
    ///
    /// Returns the first source or operator failure observed.
    pub async fn drain(mut self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        while let Some(item) = self.stream.next().await {
            let chunk = item?;
            tracing::trace!(sequence = chunk.sequence, terminal = chunk.terminal, "drained chunk");
            report.record(&chunk);
        }
        Ok(report)
    }

    /// Pull the stream to completion, gathering every payload
    ///
    /// # Errors
    ///
    /// Returns the first source or operator failure observed.
    pub async fn collect_payloads(mut self) -> Result<Vec<T>> {
        let mut payloads = Vec::new();
        while let Some(item) = self.stream.next().await {
            if let Some(payload) = item?.payload {
                payloads.push(payload);
            }
        }
        Ok(payloads)
    }

    /// Gather every envelope, panicking on failure
    #[cfg(test)]
    pub(crate) async fn collect_chunks(self) -> Vec<Chunk<T>> {
        self.stream
            .map(|item| item.expect("pump failed"))
            .collect()
            .await
    }
}

impl<T: Clone + Send + 'static> Pump<T> {
    /// Group payloads with a custom accumulator
    ///
    /// `accumulate(item, bundle)` returns the new bundle, then
    /// `close(item, new_bundle)` decides whether to emit it.
    pub fn bundle_with<A, C>(self, accumulate: A, close: C) -> Pump<Vec<T>>
    where
        A: FnMut(T, Vec<T>) -> Vec<T> + Send + 'static,
        C: FnMut(&T, &[T]) -> bool + Send + 'static,
    {
        Pump::from_stage(stage::bundle_with(self.stream, accumulate, close))
    }
}

impl<T> Stream for Pump<T> {
    type Item = Result<Chunk<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}
