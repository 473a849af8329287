//! Federation: fan-in of the local tail with the same tail from peer hosts.

pub mod aggregator;
pub mod outcome;
pub mod peer;

pub use aggregator::{AggregateStream, Aggregator, PeerRequest};
pub use outcome::{LocalOutcome, PeerOutcome, RequestSummary};
pub use peer::{LineSplitter, PeerError};

/// Marks requests issued by a peer; they are served locally only, so a
/// fully-meshed fleet never fans out recursively.
pub const FEDERATED_HEADER: &str = "x-logtail-federated";

/// One write to the shared response sink: whole records only.
pub type SinkItem = Result<bytes::Bytes, std::io::Error>;

#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;

    /// Serve `router` on an ephemeral local port; returns `host:port`.
    pub async fn spawn_peer(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }
}
