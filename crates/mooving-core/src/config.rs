//! Configuration system for Mooving clients.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MOOVING_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/mooving/config.toml
//!   3. ~/.config/mooving/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoovingConfig {
    pub endpoints: EndpointsConfig,
    pub auth: AuthConfig,
    pub broadcast: BroadcastSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Preferred base URL of the backend.
    pub primary: String,
    /// Base URL tried only when the primary cannot be reached.
    pub fallback: String,
    /// Deadline for the primary attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Deadline for each health probe attempt, in milliseconds.
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Sent as `X-API-KEY` on every request. Empty = header omitted.
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    /// Path the bulk email job is submitted to.
    pub submit_path: String,
    /// Status path prefix; the job id and a trailing slash are appended.
    pub status_path: String,
    pub poll_interval_ms: u64,
    /// Consecutive failed status queries tolerated before giving up. 0 = never give up.
    pub max_consecutive_poll_failures: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 5;

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            primary: "http://127.0.0.1:8000".to_string(),
            fallback: "http://127.0.0.1:8001".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            submit_path: "/api/admin/broadcast-email/".to_string(),
            status_path: "/api/admin/broadcast-email/status".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_consecutive_poll_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

impl BroadcastSettings {
    /// Full status path for a job: `<status_path>/<job_id>/`. The id is
    /// opaque, so it is percent-encoded as a single path segment.
    pub fn status_path_for(&self, job_id: &str) -> String {
        format!(
            "{}/{}/",
            self.status_path.trim_end_matches('/'),
            encode_segment(job_id)
        )
    }
}

/// Percent-encode everything outside RFC 3986 unreserved characters.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("mooving")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {field} url {value:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid {name} header value: {reason}")]
    InvalidHeader { name: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MoovingConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit file path; a missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            MoovingConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MOOVING_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MoovingConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MOOVING_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MOOVING_ENDPOINTS__PRIMARY") {
            self.endpoints.primary = v;
        }
        if let Some(v) = lookup("MOOVING_ENDPOINTS__FALLBACK") {
            self.endpoints.fallback = v;
        }
        if let Some(ms) = lookup("MOOVING_ENDPOINTS__TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.endpoints.timeout_ms = ms;
        }
        if let Some(ms) =
            lookup("MOOVING_ENDPOINTS__PROBE_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.endpoints.probe_timeout_ms = ms;
        }
        if let Some(v) = lookup("MOOVING_AUTH__API_KEY") {
            self.auth.api_key = v;
        }
        if let Some(ms) = lookup("MOOVING_BROADCAST__POLL_INTERVAL_MS").and_then(|v| v.parse().ok())
        {
            self.broadcast.poll_interval_ms = ms;
        }
        if let Some(n) = lookup("MOOVING_BROADCAST__MAX_CONSECUTIVE_POLL_FAILURES")
            .and_then(|v| v.parse().ok())
        {
            self.broadcast.max_consecutive_poll_failures = n;
        }
    }
}
