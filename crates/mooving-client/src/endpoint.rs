//! Endpoint client: one logical call, two physical hosts.
//!
//! Every call goes to the primary host first, bounded by the configured
//! deadline. If that attempt cannot complete an HTTP exchange (connect
//! failure, DNS, deadline) the identical request is sent once to the
//! fallback host with no deadline of its own. A response with any status
//! code, 4xx and 5xx included, counts as completed and is returned as-is.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use mooving_core::config::{ConfigError, EndpointsConfig, MoovingConfig};
use mooving_core::wire::{paths, Ack, Envelope};

use crate::error::TransportError;

const API_KEY_HEADER: &str = "x-api-key";

// ── Endpoint pair ─────────────────────────────────────────────────────────────

/// Which physical host served a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Primary,
    Fallback,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Primary => f.write_str("primary"),
            Host::Fallback => f.write_str("fallback"),
        }
    }
}

/// Primary and fallback base URLs plus the primary deadline.
/// Read-only once built; shared by every call of a client.
#[derive(Debug, Clone)]
pub struct EndpointPair {
    primary: Url,
    fallback: Url,
    timeout: Duration,
}

impl EndpointPair {
    pub fn new(primary: &str, fallback: &str, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            primary: parse_base("primary", primary)?,
            fallback: parse_base("fallback", fallback)?,
            timeout,
        })
    }

    pub fn from_config(config: &EndpointsConfig) -> Result<Self, ConfigError> {
        Self::new(
            &config.primary,
            &config.fallback,
            Duration::from_millis(config.timeout_ms),
        )
    }

    pub fn primary(&self) -> &Url {
        &self.primary
    }

    pub fn fallback(&self) -> &Url {
        &self.fallback
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base(&self, host: Host) -> &Url {
        match host {
            Host::Primary => &self.primary,
            Host::Fallback => &self.fallback,
        }
    }
}

fn parse_base(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

// ── Request / response ────────────────────────────────────────────────────────

/// One logical request. Built once and replayed unchanged on fallback.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Serialize `body` as JSON once; both attempts send these exact bytes.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Caller header; replaces any client default with the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn url_on(&self, base: &Url) -> Result<Url, TransportError> {
        let joined = if self.path.starts_with('/') {
            format!("{}{}", base.as_str().trim_end_matches('/'), self.path)
        } else {
            format!("{}/{}", base.as_str().trim_end_matches('/'), self.path)
        };
        let mut url = Url::parse(&joined).map_err(|e| TransportError::InvalidUrl {
            base: base.to_string(),
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// A completed HTTP exchange, whatever its status code.
#[derive(Debug, Clone)]
pub struct Response {
    host: Host,
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn host(&self) -> Host {
        self.host
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode a `{ success, error?, ...payload }` body. Only the `success`
    /// flag is inspected before the payload is decoded.
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<Reply<T>, serde_json::Error> {
        let ack: Ack = self.json()?;
        if !ack.success {
            return Ok(Reply::Rejected(
                ack.error.unwrap_or_else(|| "unexpected error".to_string()),
            ));
        }
        let full: Envelope<T> = self.json()?;
        Ok(Reply::Accepted(full.payload))
    }
}

/// Decoded envelope: the payload on `success: true`, the error message otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Accepted(T),
    Rejected(String),
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Cheap to clone; clones share the connection pool and configuration.
#[derive(Clone)]
pub struct EndpointClient {
    http: reqwest::Client,
    endpoints: Arc<EndpointPair>,
    default_headers: Arc<HeaderMap>,
}

impl EndpointClient {
    pub fn new(endpoints: EndpointPair) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            http: reqwest::Client::new(),
            endpoints: Arc::new(endpoints),
            default_headers: Arc::new(default_headers),
        }
    }

    /// Build from loaded configuration, including the `X-API-KEY` default header.
    pub fn from_config(config: &MoovingConfig) -> Result<Self, ConfigError> {
        let client = Self::new(EndpointPair::from_config(&config.endpoints)?);
        if config.auth.api_key.is_empty() {
            return Ok(client);
        }
        let value = HeaderValue::from_str(&config.auth.api_key).map_err(|e| {
            ConfigError::InvalidHeader {
                name: "X-API-KEY",
                reason: e.to_string(),
            }
        })?;
        Ok(client.with_default_header(HeaderName::from_static(API_KEY_HEADER), value))
    }

    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        Arc::make_mut(&mut self.default_headers).insert(name, value);
        self
    }

    pub fn endpoints(&self) -> &EndpointPair {
        &self.endpoints
    }

    /// Primary under the deadline, then at most one fallback attempt.
    pub async fn call(&self, spec: &RequestSpec) -> Result<Response, TransportError> {
        let deadline = self.endpoints.timeout;
        match self.attempt(Host::Primary, spec, Some(deadline)).await {
            Ok(resp) => Ok(resp),
            Err(primary_err) => {
                tracing::warn!(
                    method = %spec.method,
                    path = %spec.path,
                    error = %primary_err,
                    "primary unreachable, retrying on fallback"
                );
                self.attempt(Host::Fallback, spec, None)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            method = %spec.method,
                            path = %spec.path,
                            error = %e,
                            "fallback unreachable"
                        );
                    })
            }
        }
    }

    /// Find a host that answers the health endpoint, primary first.
    /// Each probe is bounded by `probe_timeout`; any status code counts as an answer.
    pub async fn probe_health(&self, probe_timeout: Duration) -> Result<Host, TransportError> {
        let spec = RequestSpec::get(paths::HEALTH);
        match self.attempt(Host::Primary, &spec, Some(probe_timeout)).await {
            Ok(_) => Ok(Host::Primary),
            Err(e) => {
                tracing::debug!(error = %e, "primary health probe failed");
                self.attempt(Host::Fallback, &spec, Some(probe_timeout))
                    .await
                    .map(|_| Host::Fallback)
            }
        }
    }

    fn merged_headers(&self, spec: &RequestSpec) -> HeaderMap {
        let mut headers = (*self.default_headers).clone();
        // `extend` with a HeaderMap replaces every default that shares a name.
        headers.extend(spec.headers.clone());
        headers
    }

    async fn attempt(
        &self,
        host: Host,
        spec: &RequestSpec,
        deadline: Option<Duration>,
    ) -> Result<Response, TransportError> {
        let url = spec.url_on(self.endpoints.base(host))?;
        tracing::debug!(%host, method = %spec.method, %url, "sending request");

        let mut request = self
            .http
            .request(spec.method.clone(), url.clone())
            .headers(self.merged_headers(spec));
        if let Some(body) = &spec.body {
            request = request.body(body.clone());
        }

        // Headers and body both have to arrive before the deadline.
        let exchange = async {
            let resp = request.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };

        let outcome = match deadline {
            Some(after) => tokio::time::timeout(after, exchange)
                .await
                .map_err(|_| TransportError::Timeout {
                    url: url.to_string(),
                    after,
                })?,
            None => exchange.await,
        };
        let (status, headers, body) = outcome.map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;

        tracing::debug!(%host, status = status.as_u16(), bytes = body.len(), "response received");
        Ok(Response {
            host,
            url,
            status,
            headers,
            body,
        })
    }
}
