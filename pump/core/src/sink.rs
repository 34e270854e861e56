//! Sink / Drain
//!
//! Directed drain hands every payload to a [`Sink`] and closes it once the
//! stream ends. The sink's artifact (for example the body stream of an HTTP
//! streaming response) is returned to the caller immediately; the write loop
//! runs on its own tokio task.
//!
//! # Close policy
//!
//! `close()` is called exactly once, whether the loop ended on the terminal
//! envelope, an upstream failure or a write failure. The first failure is
//! the one reported. A close failure that follows an earlier failure is
//! logged and otherwise dropped.
//!
//! [`DrainHandle::abort`] stops the task where it is; close is not called.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{PumpError, Result};
use crate::pump::{ChunkStream, DrainReport, Pump};

/// Terminal consumer of a pump
#[async_trait]
pub trait Sink<T: Send + 'static>: Send + 'static {
    /// Handle given to the caller as soon as the drain starts
    type Artifact;

    /// Produce the artifact
    ///
    /// Called once, before the first write.
    fn artifact(&mut self) -> Self::Artifact;

    /// Accept one payload
    async fn write(&mut self, payload: T) -> anyhow::Result<()>;

    /// Release the sink once no more payloads will arrive
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Handle on a running directed drain
#[derive(Debug)]
pub struct DrainHandle {
    task: JoinHandle<Result<DrainReport>>,
}

impl DrainHandle {
    /// Wait for the write loop to finish
    ///
    /// # Errors
    ///
    /// Returns the first source, operator or sink failure, or
    /// [`PumpError::Join`] if the task panicked or was aborted.
    pub async fn wait(self) -> Result<DrainReport> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(PumpError::Join(err.to_string())),
        }
    }

    /// Stop the write loop without closing the sink
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Whether the write loop has already finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T: Send + 'static> Pump<T> {
    /// Drain into `sink` on a spawned task
    ///
    /// Returns the sink's artifact right away together with a handle on the
    /// write loop. Must be called from within a tokio runtime.
    pub fn drain_to<S>(self, mut sink: S) -> (S::Artifact, DrainHandle)
    where
        S: Sink<T>,
    {
        let artifact = sink.artifact();
        let task = tokio::spawn(write_loop(self.into_stream(), sink));
        (artifact, DrainHandle { task })
    }
}

async fn write_loop<T, S>(mut stream: ChunkStream<T>, mut sink: S) -> Result<DrainReport>
where
    T: Send + 'static,
    S: Sink<T>,
{
    let mut report = DrainReport::default();

    let written = async {
        while let Some(item) = stream.next().await {
            let chunk = item?;
            report.record(&chunk);
            if let Some(payload) = chunk.payload {
                sink.write(payload).await.map_err(PumpError::sink)?;
            }
        }
        Ok::<_, PumpError>(())
    }
    .await;

    // Release upstream before the (possibly slow) close
    drop(stream);
    let closed = sink.close().await.map_err(PumpError::sink);

    match (written, closed) {
        (Ok(()), Ok(())) => {
            debug!(
                chunks = report.chunks,
                payloads = report.payloads,
                "sink drained"
            );
            Ok(report)
        }
        (Ok(()), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "sink close failed after an earlier failure");
            Err(err)
        }
    }
}

/// Sink that forwards payloads into a bounded channel
///
/// The artifact is the receiving half as a stream, which is what streaming
/// HTTP bodies and socket writers consume. A full channel suspends the write
/// loop, so the reader's pace propagates back to the source.
#[derive(Debug)]
pub struct ChannelSink<T> {
    tx: Option<mpsc::Sender<T>>,
    rx: Option<mpsc::Receiver<T>>,
}

impl<T> ChannelSink<T> {
    /// Create a sink backed by a channel of `capacity` payloads
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for ChannelSink<T> {
    type Artifact = ReceiverStream<T>;

    fn artifact(&mut self) -> Self::Artifact {
        // A second call gets an already-closed stream
        let rx = self.rx.take().unwrap_or_else(|| mpsc::channel(1).1);
        ReceiverStream::new(rx)
    }

    async fn write(&mut self, payload: T) -> anyhow::Result<()> {
        let Some(tx) = &self.tx else {
            anyhow::bail!("channel sink already closed");
        };
        tx.send(payload)
            .await
            .map_err(|_| anyhow::anyhow!("channel reader dropped"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Sink that writes byte payloads to an async writer
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    /// Wrap `writer`
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> Sink<Bytes> for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Artifact = ();

    fn artifact(&mut self) -> Self::Artifact {}

    async fn write(&mut self, payload: Bytes) -> anyhow::Result<()> {
        self.writer.write_all(&payload).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
