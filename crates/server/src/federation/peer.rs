//! Peer: one fetch of the same log from a secondary host.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::outcome::PeerOutcome;
use super::{SinkItem, FEDERATED_HEADER};

/// Longest partial line buffered from a peer before the fetch is abandoned.
const MAX_PARTIAL_LINE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("peer responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("response body failed after {forwarded} bytes: {source}")]
    Body {
        #[source]
        source: reqwest::Error,
        forwarded: u64,
    },

    #[error("peer sent a line longer than {0} bytes")]
    LineTooLong(usize),
}

/// Re-cuts an arbitrary byte stream at newline boundaries so every write to
/// the shared sink carries whole lines only.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: BytesMut,
}

impl LineSplitter {
    /// Feed a chunk; returns every line completed so far, newline-terminated.
    pub fn push(&mut self, chunk: Bytes) -> Option<Bytes> {
        let Some(last) = memchr::memrchr(b'\n', &chunk) else {
            self.partial.extend_from_slice(&chunk);
            return None;
        };

        let complete = if self.partial.is_empty() {
            chunk.slice(..=last)
        } else {
            self.partial.extend_from_slice(&chunk[..=last]);
            self.partial.split().freeze()
        };
        self.partial.extend_from_slice(&chunk[last + 1..]);
        Some(complete)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Flush an unterminated final line, newline-terminated.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.partial.is_empty() {
            return None;
        }
        self.partial.put_u8(b'\n');
        Some(self.partial.split().freeze())
    }
}

/// Fetch `url` from `host` and forward its body into `sink`.
///
/// Never fails: every error becomes [`PeerOutcome::Failed`], and cancellation
/// or a closed sink becomes [`PeerOutcome::Aborted`].
pub(crate) async fn fetch(
    client: reqwest::Client,
    host: String,
    url: String,
    timeout: Option<Duration>,
    sink: mpsc::Sender<SinkItem>,
    cancel: CancellationToken,
) -> PeerOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => PeerOutcome::Aborted,
        result = forward(&client, &host, &url, timeout, &sink) => match result {
            Ok(outcome) => outcome,
            Err(err) => PeerOutcome::Failed { reason: err.to_string() },
        },
    }
}

async fn forward(
    client: &reqwest::Client,
    host: &str,
    url: &str,
    timeout: Option<Duration>,
    sink: &mpsc::Sender<SinkItem>,
) -> Result<PeerOutcome, PeerError> {
    let mut request = client.get(url).header(FEDERATED_HEADER, "1");
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(PeerError::Transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(PeerError::Status(status));
    }
    debug!(host, %status, "Peer stream opened");

    let mut body = response.bytes_stream();
    let mut splitter = LineSplitter::default();
    let mut forwarded: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| PeerError::Body { source, forwarded })?;
        if let Some(lines) = splitter.push(chunk) {
            forwarded += lines.len() as u64;
            if sink.send(Ok(lines)).await.is_err() {
                return Ok(PeerOutcome::Aborted);
            }
        }
        if splitter.pending() > MAX_PARTIAL_LINE {
            return Err(PeerError::LineTooLong(MAX_PARTIAL_LINE));
        }
    }

    if let Some(last) = splitter.finish() {
        forwarded += last.len() as u64;
        if sink.send(Ok(last)).await.is_err() {
            return Ok(PeerOutcome::Aborted);
        }
    }

    Ok(PeerOutcome::Merged { bytes: forwarded })
}
