//! CLI command modules.

pub mod broadcast;
pub mod config;
pub mod health;
pub mod http;
pub mod registrations;
