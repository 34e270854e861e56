//! 1:1 payload transforms

use futures::{Future, Stream, StreamExt};

use crate::chunk::Chunk;
use crate::error::{PumpError, Result};
use crate::pump::ChunkStream;

/// Apply `f` to every payload, preserving sequence and terminal flag
pub fn map<T, U, F>(upstream: ChunkStream<T>, mut f: F) -> impl Stream<Item = Result<Chunk<U>>>
where
    T: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    upstream.map(move |item| item.map(|chunk| chunk.map_payload(&mut f)))
}

/// Apply a fallible `f` to every payload
pub fn try_map<T, U, F>(
    upstream: ChunkStream<T>,
    mut f: F,
) -> impl Stream<Item = Result<Chunk<U>>>
where
    T: Send + 'static,
    F: FnMut(T) -> anyhow::Result<U> + Send + 'static,
{
    upstream.map(move |item| {
        let chunk = item?;
        let payload = chunk
            .payload
            .map(&mut f)
            .transpose()
            .map_err(|err| PumpError::operator("map", err))?;
        Ok(Chunk {
            sequence: chunk.sequence,
            payload,
            terminal: chunk.terminal,
        })
    })
}

/// Apply an async, fallible `f` to every payload
///
/// At most one call of `f` is pending at a time; the stage does not pull
/// the next envelope until the current future resolves.
pub fn map_async<T, U, F, Fut>(
    upstream: ChunkStream<T>,
    mut f: F,
) -> impl Stream<Item = Result<Chunk<U>>>
where
    T: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<U>> + Send + 'static,
{
    upstream.then(move |item| {
        let pending = item.map(|chunk| (chunk.sequence, chunk.terminal, chunk.payload.map(&mut f)));
        async move {
            let (sequence, terminal, pending) = pending?;
            let payload = match pending {
                Some(fut) => Some(fut.await.map_err(|err| PumpError::operator("map", err))?),
                None => None,
            };
            Ok(Chunk {
                sequence,
                payload,
                terminal,
            })
        }
    })
}
