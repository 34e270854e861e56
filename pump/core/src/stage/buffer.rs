//! One-time burst buffering

use std::collections::VecDeque;

use futures::stream;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::pump::ChunkStream;

struct BufferState<T> {
    upstream: ChunkStream<T>,
    size: usize,
    held: VecDeque<Chunk<T>>,
    filled: bool,
}

/// Hold the first `size` envelopes, then release them downstream at once
///
/// Release happens as soon as `size` envelopes are held or the terminal
/// envelope arrives, whichever comes first. Afterwards the stage is a plain
/// pass-through. Count and order are never altered. A failure while filling
/// is surfaced immediately and the held envelopes are discarded.
pub fn buffer<T>(upstream: ChunkStream<T>, size: usize) -> impl Stream<Item = Result<Chunk<T>>>
where
    T: Send + 'static,
{
    let state = BufferState {
        upstream,
        size,
        held: VecDeque::with_capacity(size),
        filled: size == 0,
    };

    stream::unfold(state, |mut state| async move {
        if !state.filled {
            state.filled = true;
            while state.held.len() < state.size {
                match state.upstream.next().await {
                    Some(Ok(chunk)) => {
                        let terminal = chunk.is_terminal();
                        state.held.push_back(chunk);
                        if terminal {
                            break;
                        }
                    }
                    Some(Err(err)) => return Some((Err(err), state)),
                    None => break,
                }
            }
            debug!(held = state.held.len(), "buffer releasing burst");
        }

        if let Some(chunk) = state.held.pop_front() {
            return Some((Ok(chunk), state));
        }
        let item = state.upstream.next().await?;
        Some((item, state))
    })
}
