//! Payload filtering
//!
//! Dropped envelopes leave gaps in the sequence; nothing is renumbered. The
//! terminal envelope is always forwarded, minus its payload if the payload
//! fails the predicate.

use futures::future;
use futures::{Stream, StreamExt};

use crate::chunk::Chunk;
use crate::error::{PumpError, Result};
use crate::pump::ChunkStream;

/// Keep payloads for which `predicate` holds
pub fn filter<T, P>(upstream: ChunkStream<T>, mut predicate: P) -> impl Stream<Item = Result<Chunk<T>>>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    try_filter(upstream, move |item: &T| Ok(predicate(item)))
}

/// Keep payloads for which a fallible `predicate` holds
pub fn try_filter<T, P>(
    upstream: ChunkStream<T>,
    mut predicate: P,
) -> impl Stream<Item = Result<Chunk<T>>>
where
    T: Send + 'static,
    P: FnMut(&T) -> anyhow::Result<bool> + Send + 'static,
{
    upstream.filter_map(move |item| {
        let kept = item.and_then(|chunk| keep(chunk, &mut predicate));
        future::ready(kept.transpose())
    })
}

fn keep<T, P>(chunk: Chunk<T>, predicate: &mut P) -> Result<Option<Chunk<T>>>
where
    P: FnMut(&T) -> anyhow::Result<bool>,
{
    let payload = match chunk.payload {
        Some(value) => {
            let pass = predicate(&value).map_err(|err| PumpError::operator("filter", err))?;
            pass.then_some(value)
        }
        None => None,
    };

    if payload.is_none() && !chunk.terminal {
        return Ok(None);
    }
    Ok(Some(Chunk {
        sequence: chunk.sequence,
        payload,
        terminal: chunk.terminal,
    }))
}
