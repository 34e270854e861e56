//! Fork
//!
//! Splits one pump into two independently paced pumps over the same source.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────┐
//!   upstream ──────▶ │  ForkCore (one puller)   │
//!                    │  ┌────────┐  ┌────────┐  │
//!                    │  │queue[0]│  │queue[1]│  │
//!                    │  └───┬────┘  └───┬────┘  │
//!                    └──────┼───────────┼───────┘
//!                           ▼           ▼
//!                        branch 0    branch 1
//! ```
//!
//! A branch first drains its own queue. When the queue is empty and the
//! source is not finished, that branch performs one upstream pull; the result
//! is returned to it and a copy is queued for the other branch. The upstream
//! lock serializes pulls so only one is ever in flight; the queue lock is
//! never held across an await, so a branch with queued envelopes is served
//! even while the other one waits on a slow producer.
//!
//! No backpressure is applied on behalf of the slower branch: its queue grows
//! without bound. [`ForkOptions::queue_warn_depth`] logs when that happens.
//! A dropped branch is detached and no longer receives copies.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::pump::{ChunkStream, Pump};

/// Default backlog at which a lagging branch is reported
pub const DEFAULT_QUEUE_WARN_DEPTH: usize = 1024;

/// Tuning for [`Pump::fork_with`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkOptions {
    /// Log a warning once a branch's backlog reaches this many envelopes
    /// (`None` disables the warning)
    pub queue_warn_depth: Option<usize>,
}

impl Default for ForkOptions {
    fn default() -> Self {
        Self {
            queue_warn_depth: Some(DEFAULT_QUEUE_WARN_DEPTH),
        }
    }
}

impl ForkOptions {
    /// Set the backlog warning threshold
    #[must_use]
    pub fn with_queue_warn_depth(mut self, depth: Option<usize>) -> Self {
        self.queue_warn_depth = depth;
        self
    }
}

/// Per-branch state, guarded together so a detach and a push cannot interleave
struct Queues<T> {
    pending: [VecDeque<Result<Chunk<T>>>; 2],
    warned: [bool; 2],
    detached: [bool; 2],
}

struct ForkCore<T> {
    /// `None` once the terminal envelope or a failure has been pulled
    upstream: AsyncMutex<Option<ChunkStream<T>>>,
    queues: Mutex<Queues<T>>,
    options: ForkOptions,
}

impl<T> ForkCore<T> {
    fn new(upstream: ChunkStream<T>, options: ForkOptions) -> Self {
        Self {
            upstream: AsyncMutex::new(Some(upstream)),
            queues: Mutex::new(Queues {
                pending: [VecDeque::new(), VecDeque::new()],
                warned: [false; 2],
                detached: [false; 2],
            }),
            options,
        }
    }

    fn queues(&self) -> MutexGuard<'_, Queues<T>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self, index: usize) -> Option<Result<Chunk<T>>> {
        self.queues().pending[index].pop_front()
    }
}

/// One consumer's view of the fork
struct Branch<T> {
    core: Arc<ForkCore<T>>,
    index: usize,
}

impl<T: Clone> Branch<T> {
    async fn next(&self) -> Option<Result<Chunk<T>>> {
        if let Some(item) = self.core.pop(self.index) {
            return Some(item);
        }

        let mut upstream = self.core.upstream.lock().await;
        // The other branch may have pulled while we waited for the lock
        if let Some(item) = self.core.pop(self.index) {
            return Some(item);
        }

        let item = upstream.as_mut()?.next().await;
        let finished = match &item {
            Some(Ok(chunk)) => chunk.is_terminal(),
            Some(Err(_)) | None => true,
        };
        if finished {
            *upstream = None;
        }
        let item = item?;

        let other = 1 - self.index;
        let mut queues = self.core.queues();
        if !queues.detached[other] {
            queues.pending[other].push_back(item.clone());
            let depth = queues.pending[other].len();
            if let Some(limit) = self.core.options.queue_warn_depth {
                if depth >= limit && !queues.warned[other] {
                    queues.warned[other] = true;
                    warn!(branch = other, depth, "fork branch is falling behind");
                }
            }
        }
        drop(queues);

        Some(item)
    }
}

impl<T> Drop for Branch<T> {
    fn drop(&mut self) {
        let mut queues = self.core.queues();
        queues.detached[self.index] = true;
        queues.pending[self.index].clear();
        drop(queues);
        debug!(branch = self.index, "fork branch detached");
    }
}

impl<T: Clone + Send + 'static> Pump<T> {
    /// Split into two pumps over the same source
    ///
    /// Both branches observe the same envelopes, in the same order, ending
    /// with the same terminal envelope (or the same failure).
    pub fn fork(self) -> (Pump<T>, Pump<T>) {
        self.fork_with(ForkOptions::default())
    }

    /// [`Pump::fork`] with explicit options
    pub fn fork_with(self, options: ForkOptions) -> (Pump<T>, Pump<T>) {
        let core = Arc::new(ForkCore::new(self.into_stream(), options));

        let left = branch_pump(Arc::clone(&core), 0);
        let right = branch_pump(core, 1);
        (left, right)
    }
}

fn branch_pump<T: Clone + Send + 'static>(core: Arc<ForkCore<T>>, index: usize) -> Pump<T> {
    let branch = Branch { core, index };
    Pump::from_stage(stream::unfold(branch, |branch| async move {
        let item = branch.next().await?;
        Some((item, branch))
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use futures::stream;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;
    use crate::PumpError;

    #[tokio::test]
    async fn test_both_branches_see_everything() {
        let (left, right) = Pump::iter(vec!['a', 'b', 'c']).fork();

        let slow = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            right.collect_payloads().await
        });
        let fast = left.collect_payloads().await.unwrap();

        assert_eq!(fast, vec!['a', 'b', 'c']);
        assert_eq!(slow.await.unwrap().unwrap(), vec!['a', 'b', 'c']);
    }

    #[tokio::test]
    async fn test_branches_share_terminal_and_sequences() {
        let (left, right) = Pump::iter(vec![1, 2]).fork();
        let left = left.collect_chunks().await;
        let right = right.collect_chunks().await;

        assert_eq!(left, right);
        assert_eq!(left.last(), Some(&Chunk::terminal(2)));
    }

    #[tokio::test]
    async fn test_single_upstream_pull_fills_both_queues() {
        let (tx, rx) = mpsc::channel(4);
        let (mut left, mut right) = Pump::from_receiver(rx).fork();

        tx.send("token").await.unwrap();
        assert_eq!(left.next().await.unwrap().unwrap(), Chunk::item(0, "token"));

        // The producer is now empty; right is served from its queue
        drop(tx);
        assert_eq!(right.next().await.unwrap().unwrap(), Chunk::item(0, "token"));
        assert!(right.next().await.unwrap().unwrap().is_terminal());
        assert!(left.next().await.unwrap().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_queued_branch_not_blocked_by_pending_pull() {
        let (tx, rx) = mpsc::channel(4);
        let (mut left, mut right) = Pump::from_receiver(rx).fork();

        tx.send(1).await.unwrap();
        assert_eq!(left.next().await.unwrap().unwrap(), Chunk::item(0, 1));

        // Left now waits on an empty producer while holding the pull
        let waiting = tokio::spawn(async move {
            let item = left.next().await;
            (item, left)
        });
        tokio::task::yield_now().await;

        let queued = tokio::time::timeout(Duration::from_secs(1), right.next())
            .await
            .expect("right branch blocked behind left's pull");
        assert_eq!(queued.unwrap().unwrap(), Chunk::item(0, 1));

        tx.send(2).await.unwrap();
        let (item, _left) = waiting.await.unwrap();
        assert_eq!(item.unwrap().unwrap(), Chunk::item(1, 2));
        assert_eq!(right.next().await.unwrap().unwrap(), Chunk::item(1, 2));
    }

    #[tokio::test]
    async fn test_failure_reaches_both_branches() {
        let producer = stream::iter(vec![Ok(1), Err(anyhow::anyhow!("upstream reset"))]);
        let (left, right) = Pump::from_try_stream(producer).fork();

        let left = left.collect_payloads().await;
        let right = right.collect_payloads().await;
        assert!(matches!(left, Err(PumpError::Source(_))));
        assert!(matches!(right, Err(PumpError::Source(_))));
    }

    #[tokio::test]
    async fn test_dropped_branch_does_not_block_other() {
        let (left, right) = Pump::iter(0..100).fork();
        let mut right = right.into_stream();
        let _ = right.next().await;
        drop(right);

        let values = left.collect_payloads().await.unwrap();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_detached_branch_stops_receiving_copies() {
        let core = Arc::new(ForkCore::new(
            Pump::iter(0..10).into_stream(),
            ForkOptions::default(),
        ));
        let left = Branch {
            core: Arc::clone(&core),
            index: 0,
        };
        let right = Branch {
            core: Arc::clone(&core),
            index: 1,
        };

        left.next().await.unwrap().unwrap();
        left.next().await.unwrap().unwrap();
        assert_eq!(core.queues().pending[1].len(), 2);

        drop(right);
        assert!(core.queues().detached[1]);
        assert!(core.queues().pending[1].is_empty());

        while let Some(item) = left.next().await {
            item.unwrap();
        }
        assert!(core.queues().pending[1].is_empty());
    }

    #[tokio::test]
    async fn test_detach_during_pending_pull_leaves_queue_empty() {
        let (tx, rx) = mpsc::channel(4);
        let core = Arc::new(ForkCore::new(
            Pump::from_receiver(rx).into_stream(),
            ForkOptions::default(),
        ));
        let left = Branch {
            core: Arc::clone(&core),
            index: 0,
        };
        let right = Branch {
            core: Arc::clone(&core),
            index: 1,
        };

        // Left holds the upstream pull while right goes away
        let pulling = tokio::spawn(async move {
            let item = left.next().await;
            (item, left)
        });
        tokio::task::yield_now().await;
        drop(right);

        tx.send('x').await.unwrap();
        let (item, _left) = pulling.await.unwrap();
        assert_eq!(item.unwrap().unwrap(), Chunk::item(0, 'x'));

        let queues = core.queues();
        assert!(queues.detached[1]);
        assert!(queues.pending[1].is_empty());
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
    async fn test_dropping_both_branches_releases_producer() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = Tracked {
            dropped: Arc::clone(&dropped),
        };
        let producer = stream::iter(0..).map(move |v| {
            let _held = &guard;
            v
        });

        let (mut left, right) = Pump::from_stream(producer).fork();
        assert!(left.next().await.is_some());

        drop(left);
        assert!(!dropped.load(Ordering::SeqCst));
        drop(right);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lagging_branch_past_warn_depth_loses_nothing() {
        let options = ForkOptions::default().with_queue_warn_depth(Some(2));
        let (left, right) = Pump::iter(0..5).fork_with(options);

        // Left runs ahead, right's backlog crosses the threshold
        assert_eq!(left.collect_payloads().await.unwrap().len(), 5);
        assert_eq!(right.collect_payloads().await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fork_of_fork() {
        let (a, b) = Pump::iter(vec!["x", "y"]).fork();
        let (b1, b2) = b.fork();

        assert_eq!(a.collect_payloads().await.unwrap(), vec!["x", "y"]);
        assert_eq!(b1.collect_payloads().await.unwrap(), vec!["x", "y"]);
        assert_eq!(b2.collect_payloads().await.unwrap(), vec!["x", "y"]);
    }
}
