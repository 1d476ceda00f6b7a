//! mooving-core: configuration and JSON wire types shared by the
//! Mooving client library and operator tools.

pub mod config;
pub mod wire;

pub use config::{AuthConfig, BroadcastSettings, ConfigError, EndpointsConfig, MoovingConfig};
pub use wire::{Envelope, JobStatus};
