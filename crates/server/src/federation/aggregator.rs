use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use reader::ReaderError;

use super::outcome::{BranchOutcome, LocalOutcome, PeerOutcome, RequestSummary};
use super::{peer, SinkItem};
use crate::config::FederationConfig;
use crate::metrics::{StreamGuard, StreamMetrics};

/// The part of an inbound request replayed against every peer.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    pub filename: String,
    /// Raw query string, forwarded verbatim.
    pub query: Option<String>,
}

/// Merges the local framed tail with the same tail fetched from every
/// secondary host into one response stream.
///
/// Ordering: none across sources. Records from the local reader and from
/// each peer interleave in arrival order. Within one source, order is kept,
/// and every write to the sink is one or more whole records, so framing is
/// never split by another source.
///
/// The merged stream ends only after the local stream has drained and every
/// peer fetch has settled, whether it succeeded or not. Peer failures are
/// logged and contribute nothing; they never fail the response.
pub struct Aggregator {
    client: reqwest::Client,
    peers: Vec<String>,
    scheme: String,
    timeout: Option<Duration>,
    capacity: usize,
    metrics: StreamMetrics,
}

impl Aggregator {
    pub fn new(client: reqwest::Client, config: &FederationConfig, metrics: StreamMetrics) -> Self {
        Self {
            client,
            peers: config.secondary_hosts.clone(),
            scheme: config.scheme.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
            capacity: config.channel_capacity.max(1),
            metrics,
        }
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// URL of the equivalent endpoint on `host`.
    pub fn peer_url(&self, host: &str, request: &PeerRequest) -> String {
        match request.query.as_deref().filter(|q| !q.is_empty()) {
            Some(query) => format!("{}://{}/logs/{}?{}", self.scheme, host, request.filename, query),
            None => format!("{}://{}/logs/{}", self.scheme, host, request.filename),
        }
    }

    /// Start every branch and return the merged stream.
    ///
    /// With `federate = false` only the local stream is served (used for
    /// requests that themselves came from a peer).
    pub fn aggregate<S>(&self, local: S, request: PeerRequest, federate: bool) -> AggregateStream
    where
        S: Stream<Item = Result<Bytes, ReaderError>> + Send + 'static,
    {
        let (sink, receiver) = mpsc::channel::<SinkItem>(self.capacity);
        let cancel = CancellationToken::new();
        let mut branches = JoinSet::new();

        branches.spawn(drive_local(local, sink.clone(), cancel.clone()));

        if federate {
            for host in &self.peers {
                let url = self.peer_url(host, &request);
                let host = host.clone();
                let client = self.client.clone();
                let timeout = self.timeout;
                let sink = sink.clone();
                let cancel = cancel.clone();
                branches.spawn(async move {
                    debug!(host = %host, url = %url, "Fetching from peer");
                    let outcome = peer::fetch(client, host.clone(), url, timeout, sink, cancel).await;
                    BranchOutcome::Peer { host, outcome }
                });
            }
        }

        // Only the branches hold senders now; the receiver ends once they all settle.
        drop(sink);

        let metrics = self.metrics.clone();
        let filename = request.filename;
        tokio::spawn(async move {
            let mut summary = RequestSummary::default();
            while let Some(joined) = branches.join_next().await {
                match joined {
                    Ok(outcome) => summary.record(outcome),
                    Err(err) => warn!(file = %filename, "Aggregation branch panicked: {}", err),
                }
            }
            report(&filename, &summary, &metrics);
        });

        AggregateStream {
            inner: ReceiverStream::new(receiver),
            metrics: self.metrics.clone(),
            _cancel_on_drop: cancel.drop_guard(),
            _stream_guard: self.metrics.stream_started(),
        }
    }
}

async fn drive_local<S>(local: S, sink: mpsc::Sender<SinkItem>, cancel: CancellationToken) -> BranchOutcome
where
    S: Stream<Item = Result<Bytes, ReaderError>> + Send + 'static,
{
    // Pinned here so dropping this future drops the reader and its file handle.
    let mut local = Box::pin(local);
    let mut records: u64 = 0;

    let outcome = loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = local.next() => Some(next),
        };
        let Some(next) = polled else {
            break LocalOutcome::Aborted { records };
        };

        match next {
            Some(Ok(frame)) => {
                if sink.send(Ok(frame)).await.is_err() {
                    break LocalOutcome::Aborted { records };
                }
                records += 1;
            }
            Some(Err(err)) => {
                let reason = err.to_string();
                // Surfacing the error through the body aborts the response.
                let _ = sink.send(Err(err.into())).await;
                cancel.cancel();
                break LocalOutcome::Failed { records, reason };
            }
            None => break LocalOutcome::Completed { records },
        }
    };

    BranchOutcome::Local(outcome)
}

fn report(filename: &str, summary: &RequestSummary, metrics: &StreamMetrics) {
    for (host, outcome) in &summary.peers {
        match outcome {
            PeerOutcome::Merged { .. } => {
                metrics.peer_merged();
                debug!(file = %filename, peer = %host, "Peer {}", outcome);
            }
            PeerOutcome::Failed { .. } => {
                metrics.peer_failed(host);
                warn!(file = %filename, peer = %host, "Peer {}", outcome);
            }
            PeerOutcome::Aborted => {
                debug!(file = %filename, peer = %host, "Peer {}", outcome);
            }
        }
    }

    match &summary.local {
        Some(local @ LocalOutcome::Failed { .. }) => warn!(
            file = %filename,
            merged = summary.merged_peers(),
            failed = summary.failed_peers(),
            "Tail request failed: local {}",
            local
        ),
        _ if summary.is_aborted() => warn!(
            file = %filename,
            merged = summary.merged_peers(),
            failed = summary.failed_peers(),
            "Tail request aborted by client"
        ),
        Some(local) => info!(
            file = %filename,
            merged = summary.merged_peers(),
            failed = summary.failed_peers(),
            "Tail request completed: local {}",
            local
        ),
        None => warn!(file = %filename, "Tail request settled without a local outcome"),
    }
}

/// Response body of a federated tail.
///
/// Dropping it (client disconnect) cancels every branch still running.
pub struct AggregateStream {
    inner: ReceiverStream<SinkItem>,
    metrics: StreamMetrics,
    _cancel_on_drop: DropGuard,
    _stream_guard: StreamGuard,
}

impl Stream for AggregateStream {
    type Item = SinkItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.metrics.record_sent(chunk);
        }
        polled
    }
}
