//! mooving-client: resilient access to the registration backend.
//!
//! [`EndpointClient`] hides the primary/fallback host pair behind a single
//! `call`. [`BroadcastMonitor`] builds on it to launch a bulk email job and
//! follow its progress. [`AdminApi`] wraps the remaining JSON endpoints.

pub mod admin;
pub mod broadcast;
pub mod endpoint;
pub mod error;

pub use admin::{AdminApi, PaymentStatus};
pub use broadcast::{BroadcastJob, BroadcastMonitor, BroadcastTarget, JobId, MonitorState};
pub use endpoint::{EndpointClient, EndpointPair, Host, Reply, RequestSpec, Response};
pub use error::{
    ApiError, BroadcastError, PollError, SubmissionError, TransportError, ValidationError,
};
pub use mooving_core::wire::{Course, CreatedRegistration, JobStatus, Modality, NewRegistration};
