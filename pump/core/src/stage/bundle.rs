//! Variable-size aggregation driven by a closing condition
//!
//! The default accumulator appends the incoming payload before the closing
//! condition is evaluated, so the item that triggers closure is part of the
//! bundle it closes. A closing condition that returns true for a one-item
//! bundle emits it immediately; whether an empty bundle may close is left to
//! the caller's condition.

use futures::stream;
use futures::{Stream, StreamExt};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::pump::ChunkStream;

struct BundleState<T, S> {
    upstream: ChunkStream<T>,
    step: S,
    buffer: Vec<T>,
}

/// Bundle payloads until `close(item, bundle)` returns true
pub fn bundle<T, C>(upstream: ChunkStream<T>, mut close: C) -> impl Stream<Item = Result<Chunk<Vec<T>>>>
where
    T: Send + 'static,
    C: FnMut(&T, &[T]) -> bool + Send + 'static,
{
    bundle_by(upstream, move |item, mut buffer: Vec<T>| {
        buffer.push(item);
        let closed = buffer.last().is_some_and(|last| close(last, &buffer));
        (buffer, closed)
    })
}

/// Bundle payloads with a custom accumulator
///
/// `accumulate(item, bundle)` produces the new bundle; `close(item, bundle)`
/// is then evaluated against it.
pub fn bundle_with<T, A, C>(
    upstream: ChunkStream<T>,
    mut accumulate: A,
    mut close: C,
) -> impl Stream<Item = Result<Chunk<Vec<T>>>>
where
    T: Clone + Send + 'static,
    A: FnMut(T, Vec<T>) -> Vec<T> + Send + 'static,
    C: FnMut(&T, &[T]) -> bool + Send + 'static,
{
    bundle_by(upstream, move |item: T, buffer| {
        let trigger = item.clone();
        let buffer = accumulate(item, buffer);
        let closed = close(&trigger, &buffer);
        (buffer, closed)
    })
}

fn bundle_by<T, S>(upstream: ChunkStream<T>, step: S) -> impl Stream<Item = Result<Chunk<Vec<T>>>>
where
    T: Send + 'static,
    S: FnMut(T, Vec<T>) -> (Vec<T>, bool) + Send + 'static,
{
    let state = BundleState {
        upstream,
        step,
        buffer: Vec::new(),
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        loop {
            let chunk = match state.upstream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return Some((Err(err), None)),
                None => return None,
            };

            let mut closed = false;
            if let Some(item) = chunk.payload {
                let buffer = std::mem::take(&mut state.buffer);
                let (buffer, close) = (state.step)(item, buffer);
                state.buffer = buffer;
                closed = close;
            }

            if chunk.terminal {
                let rest = std::mem::take(&mut state.buffer);
                return Some((Ok(Chunk::terminal_with(chunk.sequence, rest)), None));
            }

            if closed {
                let bundle = std::mem::take(&mut state.buffer);
                return Some((Ok(Chunk::item(chunk.sequence, bundle)), Some(state)));
            }
        }
    })
}
