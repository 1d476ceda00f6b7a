//! Error taxonomy for the client.
//!
//! Only [`TransportError`] is ever recovered automatically (by the fallback
//! hop in [`crate::EndpointClient::call`]). Everything else reaches the caller.

use std::time::Duration;

use crate::broadcast::JobId;

/// A single physical attempt could not complete an HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out after {}ms", .after.as_millis())]
    Timeout { url: String, after: Duration },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot build url from base {base:?} and path {path:?}: {reason}")]
    InvalidUrl {
        base: String,
        path: String,
        reason: String,
    },
}

/// Caller input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("subject must not be empty")]
    EmptySubject,
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("explicit recipient list must not be empty")]
    NoRecipients,
    #[error("athlete declaration must be accepted")]
    MissingDeclaration,
    #[error("CPF must have 11 digits")]
    InvalidCpf,
}

/// The backend rejected the broadcast or could not start it.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode submission: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid submission response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("backend rejected broadcast: {0}")]
    Rejected(String),
    #[error("backend accepted broadcast without a task id")]
    MissingJobId,
}

/// One status query failed. Tolerated up to the configured threshold.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid status response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("backend reported status failure: {0}")]
    Rejected(String),
    #[error("inconsistent counts: sent {sent} + failed {failed} exceeds total {total}")]
    Inconsistent { total: u64, sent: u64, failed: u64 },
}

/// Terminal failure of a [`crate::BroadcastMonitor`] operation.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("invalid broadcast: {0}")]
    Validation(#[from] ValidationError),
    #[error("broadcast submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("gave up after {failures} consecutive failed status queries: {last}")]
    Poll {
        failures: u32,
        #[source]
        last: PollError,
    },
    #[error("broadcast observation cancelled")]
    Cancelled { job_id: Option<JobId> },
    #[error("a broadcast is already in flight on this monitor")]
    Busy,
    #[error("no broadcast has been submitted")]
    NotStarted,
}

/// Failure of a generic admin API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Rejected(String),
}
