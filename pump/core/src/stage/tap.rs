//! Side-effect observation

use futures::{Stream, StreamExt};

use crate::chunk::Chunk;
use crate::error::{PumpError, Result};
use crate::pump::ChunkStream;

/// Invoke `f` once per envelope (terminal included) and forward it unchanged
pub fn on_chunk<T, F>(upstream: ChunkStream<T>, mut f: F) -> impl Stream<Item = Result<Chunk<T>>>
where
    T: Send + 'static,
    F: FnMut(&Chunk<T>) -> anyhow::Result<()> + Send + 'static,
{
    upstream.map(move |item| {
        let chunk = item?;
        f(&chunk).map_err(|err| PumpError::operator("on_chunk", err))?;
        Ok(chunk)
    })
}

/// Infallible form of [`on_chunk`]
pub fn tap<T, F>(upstream: ChunkStream<T>, mut f: F) -> impl Stream<Item = Result<Chunk<T>>>
where
    T: Send + 'static,
    F: FnMut(&Chunk<T>) + Send + 'static,
{
    on_chunk(upstream, move |chunk: &Chunk<T>| {
        f(chunk);
        Ok(())
    })
}
