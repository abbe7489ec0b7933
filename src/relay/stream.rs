//! Streaming relay between an upstream byte stream and the client body.
//!
//! A spawned producer reads upstream chunks and pushes them into a bounded
//! channel; the receiving half becomes the response body. Chunks are
//! forwarded as received, never re-framed. When the body is dropped (the
//! client went away) the producer stops reading and drops the upstream
//! stream, which releases the upstream connection.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

/// Item type of the client-facing body stream.
pub type BodyChunk = Result<Bytes, std::io::Error>;

/// Bytes moved through one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// How a relayed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Upstream ended normally.
    Completed(StreamStats),
    /// Upstream failed mid-transfer; the error was passed to the client body.
    Failed(StreamStats),
    /// Client body was dropped before the upstream finished.
    Cancelled(StreamStats),
}

impl StreamOutcome {
    pub fn stats(&self) -> StreamStats {
        match self {
            StreamOutcome::Completed(s) | StreamOutcome::Failed(s) | StreamOutcome::Cancelled(s) => {
                *s
            }
        }
    }
}

/// Start relaying `upstream` into a bounded channel of `capacity` chunks.
///
/// Returns the client-facing stream and a handle resolving to the outcome.
pub fn relay_stream<S, E>(
    upstream: S,
    capacity: usize,
) -> (ReceiverStream<BodyChunk>, JoinHandle<StreamOutcome>)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(pump(upstream, tx).in_current_span());
    (ReceiverStream::new(rx), handle)
}

async fn pump<S, E>(upstream: S, tx: mpsc::Sender<BodyChunk>) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    let mut upstream = Box::pin(upstream);
    let mut stats = StreamStats::default();

    let outcome = loop {
        let next = tokio::select! {
            // Watch for the client going away even while upstream is idle.
            _ = tx.closed() => break StreamOutcome::Cancelled(stats),
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let len = chunk.len() as u64;
                if tx.send(Ok(chunk)).await.is_err() {
                    break StreamOutcome::Cancelled(stats);
                }
                stats.chunks += 1;
                stats.bytes += len;
            }
            Some(Err(e)) => {
                tracing::error!(
                    error = %e,
                    chunks = stats.chunks,
                    bytes = stats.bytes,
                    "Upstream stream failed"
                );
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                break StreamOutcome::Failed(stats);
            }
            None => break StreamOutcome::Completed(stats),
        }
    };

    match outcome {
        StreamOutcome::Completed(s) => {
            tracing::info!(chunks = s.chunks, bytes = s.bytes, "Stream completed")
        }
        StreamOutcome::Cancelled(s) => tracing::info!(
            chunks = s.chunks,
            bytes = s.bytes,
            "Client disconnected, upstream stream dropped"
        ),
        StreamOutcome::Failed(_) => {}
    }

    outcome
}
