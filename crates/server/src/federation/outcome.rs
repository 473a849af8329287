//! Outcome: terminal states of each branch of a federated read.

use std::fmt;

/// Terminal state of the local reader branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The reader drained; every record reached the sink.
    Completed { records: u64 },
    /// A read failed mid-stream; the response was aborted.
    Failed { records: u64, reason: String },
    /// The client went away before the reader drained.
    Aborted { records: u64 },
}

/// Terminal state of one secondary fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutcome {
    Merged { bytes: u64 },
    /// Skipped: unreachable, non-success status, or broken body.
    Failed { reason: String },
    /// Skipped: the client went away first.
    Aborted,
}

/// What a finished branch reports to the supervisor.
#[derive(Debug)]
pub(crate) enum BranchOutcome {
    Local(LocalOutcome),
    Peer { host: String, outcome: PeerOutcome },
}

/// Outcomes of every branch of one request, logged once all have settled.
#[derive(Debug, Default)]
pub struct RequestSummary {
    pub local: Option<LocalOutcome>,
    pub peers: Vec<(String, PeerOutcome)>,
}

impl RequestSummary {
    pub(crate) fn record(&mut self, outcome: BranchOutcome) {
        match outcome {
            BranchOutcome::Local(local) => self.local = Some(local),
            BranchOutcome::Peer { host, outcome } => self.peers.push((host, outcome)),
        }
    }

    pub fn merged_peers(&self) -> usize {
        self.peers
            .iter()
            .filter(|(_, o)| matches!(o, PeerOutcome::Merged { .. }))
            .count()
    }

    pub fn failed_peers(&self) -> usize {
        self.peers
            .iter()
            .filter(|(_, o)| matches!(o, PeerOutcome::Failed { .. }))
            .count()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.local, Some(LocalOutcome::Aborted { .. }))
            || self.peers.iter().any(|(_, o)| *o == PeerOutcome::Aborted)
    }
}

impl fmt::Display for LocalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalOutcome::Completed { records } => write!(f, "completed ({} records)", records),
            LocalOutcome::Failed { records, reason } => {
                write!(f, "failed after {} records: {}", records, reason)
            }
            LocalOutcome::Aborted { records } => write!(f, "aborted after {} records", records),
        }
    }
}

impl fmt::Display for PeerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerOutcome::Merged { bytes } => write!(f, "merged ({} bytes)", bytes),
            PeerOutcome::Failed { reason } => write!(f, "skipped: {}", reason),
            PeerOutcome::Aborted => write!(f, "skipped: aborted"),
        }
    }
}
