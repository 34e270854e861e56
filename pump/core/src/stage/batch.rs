//! Fixed-size aggregation

use futures::stream;
use futures::{Stream, StreamExt};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::pump::ChunkStream;

struct BatchState<T> {
    upstream: ChunkStream<T>,
    size: usize,
}

/// Accumulate up to `size` payloads into one envelope
///
/// A batch carries the sequence number of its first item. When the terminal
/// envelope arrives, any remaining items are flushed with the terminal flag
/// set; with nothing left a bare terminal envelope is emitted instead. A
/// `size` of zero is treated as one.
pub fn batch<T>(upstream: ChunkStream<T>, size: usize) -> impl Stream<Item = Result<Chunk<Vec<T>>>>
where
    T: Send + 'static,
{
    let state = BatchState {
        upstream,
        size: size.max(1),
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        let mut items = Vec::with_capacity(state.size);
        let mut first = None;

        loop {
            let chunk = match state.upstream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return Some((Err(err), None)),
                None => return None,
            };

            if let Some(payload) = chunk.payload {
                first.get_or_insert(chunk.sequence);
                items.push(payload);
            }

            if chunk.terminal {
                let flushed = match first {
                    Some(sequence) => Chunk::terminal_with(sequence, items),
                    None => Chunk::terminal(chunk.sequence),
                };
                return Some((Ok(flushed), None));
            }

            if let (Some(sequence), true) = (first, items.len() == state.size) {
                return Some((Ok(Chunk::item(sequence, items)), Some(state)));
            }
        }
    })
}
