//! Pipeline assembly for the `pump` binary
//!
//! ```text
//! input ─▶ reader task ─▶ channel ─▶ Source ─▶ segment ─▶ buffer ─┬─▶ [batch] ─▶ encode ─▶ stdout
//!                                                                 └─▶ stats (with --stats)
//! ```

use anyhow::{Context, Result};
use pump_core::{CancellationToken, DrainReport, PipelineConfig, Pump, Source, WriterSink};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// Counts gathered on the stats branch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Segments emitted
    pub segments: usize,
    /// Characters across all segments
    pub chars: usize,
}

/// Result of one run
#[derive(Debug)]
pub struct Outcome {
    /// What the output drain observed
    pub report: DrainReport,
    /// Present when the stats branch ran
    pub stats: Option<SegmentStats>,
}

/// Split a line into token-like fragments, keeping whitespace attached
pub fn fragments(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split_inclusive(char::is_whitespace).map(str::to_string)
}

/// Read `input` on its own task, one fragment per channel slot
///
/// The channel is the backpressure boundary: a slow pipeline stalls the
/// reader once `capacity` fragments are waiting.
fn spawn_reader<R>(input: R, capacity: usize) -> mpsc::Receiver<std::io::Result<String>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = format!("{line}\n");
                    for fragment in fragments(&line) {
                        if tx.send(Ok(fragment)).await.is_err() {
                            debug!("pipeline stopped reading input");
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    });
    rx
}

async fn tally(segments: Pump<String>) -> pump_core::Result<SegmentStats> {
    let lengths = segments
        .map(|segment| segment.chars().count())
        .collect_payloads()
        .await?;

    let stats = SegmentStats {
        segments: lengths.len(),
        chars: lengths.iter().sum(),
    };
    info!(segments = stats.segments, chars = stats.chars, "segment stats");
    Ok(stats)
}

/// Run `input` through the configured pipeline into `output`
///
/// # Errors
///
/// Returns the first read, pipeline or write failure. Cancellation surfaces
/// as [`pump_core::PumpError::Cancelled`].
pub async fn run<R, W>(
    config: &PipelineConfig,
    input: R,
    output: W,
    cancel: CancellationToken,
    with_stats: bool,
) -> Result<Outcome>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let rx = spawn_reader(input, config.channel_capacity);
    let segments = Source::fallible(ReceiverStream::new(rx))
        .with_cancellation(cancel)
        .into_pump()
        .segment(config.mode, config.min_chars)
        .buffer(config.buffer_size);

    let (segments, stats) = if with_stats {
        let (segments, branch) = segments.fork_with(config.fork_options());
        (segments, Some(tokio::spawn(tally(branch))))
    } else {
        (segments, None)
    };

    let encoded = match config.batch_size {
        Some(size) => segments.batch(size).encode(config.format),
        None => segments.encode(config.format),
    };

    let ((), handle) = encoded.drain_to(WriterSink::new(output));
    let report = handle.wait().await.context("Pipeline failed")?;

    let stats = match stats {
        Some(task) => Some(task.await.context("Stats task failed")??),
        None => None,
    };

    Ok(Outcome { report, stats })
}
