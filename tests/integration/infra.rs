//! Test infrastructure: an in-process fake of the registration backend.
//!
//! Every route answers from a script the test controls and counts its hits,
//! so a test can assert exactly which host was asked what and how often.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mooving_client::{BroadcastMonitor, EndpointClient, EndpointPair};
use mooving_core::config::BroadcastSettings;

/// Deadline for the primary attempt in tests that do not care about it.
pub const PRIMARY_TIMEOUT: Duration = Duration::from_millis(200);
pub const POLL_INTERVAL_MS: u64 = 25;

// ── Scripted replies ──────────────────────────────────────────────────────────

/// One canned answer: status code, JSON (or raw) body, and how long to stall first.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn send(self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            self.body,
        )
            .into_response()
    }
}

/// Progress payload the way the backend reports it.
pub fn progress(status: &str, total: u64, sent: u64, failed: u64) -> Reply {
    Reply::json(json!({
        "success": true,
        "status": status,
        "total": total,
        "sent_count": sent,
        "failed_count": failed,
        "current_name": format!("Recipient {}", sent + failed),
    }))
}

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub route: &'static str,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Seen {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    }
}

// ── Backend state ─────────────────────────────────────────────────────────────

pub struct BackendState {
    hits: Mutex<HashMap<&'static str, usize>>,
    total: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    echo: Mutex<Reply>,
    health: Mutex<Reply>,
    submit: Mutex<Reply>,
    /// Popped once per status query; the last entry repeats when the queue runs dry.
    polls: Mutex<VecDeque<Reply>>,
    registrations: Mutex<Reply>,
    resend: Mutex<Reply>,
    verify: Mutex<Reply>,
    register: Mutex<Reply>,
    status_ids: Mutex<Vec<String>>,
    session_ids: Mutex<Vec<String>>,
    polls_in_flight: AtomicUsize,
    max_polls_in_flight: AtomicUsize,
}

impl BackendState {
    fn new() -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            echo: Mutex::new(Reply::json(json!({ "success": true }))),
            health: Mutex::new(Reply::json(json!({ "status": "healthy" }))),
            submit: Mutex::new(Reply::json(json!({ "success": true, "task_id": "job-1" }))),
            polls: Mutex::new(VecDeque::from([progress("done", 0, 0, 0)])),
            registrations: Mutex::new(Reply::json(json!({
                "success": true,
                "registrations": [],
            }))),
            resend: Mutex::new(Reply::json(json!({ "success": true }))),
            verify: Mutex::new(Reply::json(json!({
                "success": true,
                "payment_status": "paid",
            }))),
            register: Mutex::new(Reply::with_status(
                201,
                json!({
                    "id": 31,
                    "full_name": "Rui Costa",
                    "email": "rui@example.org",
                    "modality": "ADULTO",
                    "age": 36,
                    "confirmation_email_sent": false,
                    "created_at": "2026-10-16T09:00:00Z",
                }),
            )),
            status_ids: Mutex::new(Vec::new()),
            session_ids: Mutex::new(Vec::new()),
            polls_in_flight: AtomicUsize::new(0),
            max_polls_in_flight: AtomicUsize::new(0),
        }
    }

    fn record(&self, route: &'static str, headers: HeaderMap, body: Bytes) {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.hits.lock().unwrap().entry(route).or_default() += 1;
        self.seen.lock().unwrap().push(Seen {
            route,
            headers,
            body,
        });
    }

    fn next_poll(&self) -> Reply {
        let mut polls = self.polls.lock().unwrap();
        if polls.len() > 1 {
            polls.pop_front().unwrap()
        } else {
            polls.front().cloned().unwrap()
        }
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

pub const ECHO: &str = "/echo";

async fn echo(State(s): State<Arc<BackendState>>, headers: HeaderMap, body: Bytes) -> Response {
    s.record("echo", headers, body);
    let reply = s.echo.lock().unwrap().clone();
    reply.send().await
}

async fn health(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    s.record("health", headers, Bytes::new());
    let reply = s.health.lock().unwrap().clone();
    reply.send().await
}

async fn submit(State(s): State<Arc<BackendState>>, headers: HeaderMap, body: Bytes) -> Response {
    s.record("submit", headers, body);
    let reply = s.submit.lock().unwrap().clone();
    reply.send().await
}

async fn status(
    State(s): State<Arc<BackendState>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    s.record("status", headers, Bytes::new());
    s.status_ids.lock().unwrap().push(task_id);
    let reply = s.next_poll();
    let now = s.polls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    s.max_polls_in_flight.fetch_max(now, Ordering::SeqCst);
    let resp = reply.send().await;
    s.polls_in_flight.fetch_sub(1, Ordering::SeqCst);
    resp
}

async fn registrations(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    s.record("registrations", headers, Bytes::new());
    let reply = s.registrations.lock().unwrap().clone();
    reply.send().await
}

async fn resend(State(s): State<Arc<BackendState>>, headers: HeaderMap, body: Bytes) -> Response {
    s.record("resend", headers, body);
    let reply = s.resend.lock().unwrap().clone();
    reply.send().await
}

async fn register(
    State(s): State<Arc<BackendState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    s.record("register", headers, body);
    let reply = s.register.lock().unwrap().clone();
    reply.send().await
}

async fn verify(
    State(s): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    s.record("verify", headers, Bytes::new());
    if let Some(id) = params.get("session_id") {
        s.session_ids.lock().unwrap().push(id.clone());
    }
    let reply = s.verify.lock().unwrap().clone();
    reply.send().await
}

// ── Backend handle ────────────────────────────────────────────────────────────

/// A fake backend listening on an ephemeral loopback port.
/// Stops serving when dropped.
pub struct Backend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl Backend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let app = Router::new()
            .route(ECHO, any(echo))
            .route("/api/health/", get(health))
            .route("/api/admin/broadcast-email/", post(submit))
            .route("/api/admin/broadcast-email/status/{task_id}/", get(status))
            .route("/api/admin/paid-registrations/", get(registrations))
            .route("/api/admin/resend-email/", post(resend))
            .route("/api/payment/verify-status/", get(verify))
            .route("/api/race-registrations/", post(register))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self, route: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(route)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.total.load(Ordering::SeqCst)
    }

    pub fn seen(&self, route: &str) -> Vec<Seen> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.route == route)
            .cloned()
            .collect()
    }

    pub fn status_ids(&self) -> Vec<String> {
        self.state.status_ids.lock().unwrap().clone()
    }

    /// Highest number of status queries the backend was serving at once.
    pub fn max_concurrent_polls(&self) -> usize {
        self.state.max_polls_in_flight.load(Ordering::SeqCst)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.state.session_ids.lock().unwrap().clone()
    }

    pub fn on_echo(&self, reply: Reply) {
        *self.state.echo.lock().unwrap() = reply;
    }

    pub fn on_health(&self, reply: Reply) {
        *self.state.health.lock().unwrap() = reply;
    }

    pub fn on_submit(&self, reply: Reply) {
        *self.state.submit.lock().unwrap() = reply;
    }

    pub fn on_polls(&self, replies: Vec<Reply>) {
        assert!(!replies.is_empty(), "poll script needs at least one reply");
        *self.state.polls.lock().unwrap() = replies.into();
    }

    pub fn on_registrations(&self, reply: Reply) {
        *self.state.registrations.lock().unwrap() = reply;
    }

    pub fn on_resend(&self, reply: Reply) {
        *self.state.resend.lock().unwrap() = reply;
    }

    pub fn on_register(&self, reply: Reply) {
        *self.state.register.lock().unwrap() = reply;
    }

    pub fn on_verify(&self, reply: Reply) {
        *self.state.verify.lock().unwrap() = reply;
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A loopback address nothing listens on: connections are refused at once.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// ── Client helpers ────────────────────────────────────────────────────────────

pub fn client(primary: &str, fallback: &str) -> EndpointClient {
    client_with_timeout(primary, fallback, PRIMARY_TIMEOUT)
}

pub fn client_with_timeout(primary: &str, fallback: &str, timeout: Duration) -> EndpointClient {
    EndpointClient::new(EndpointPair::new(primary, fallback, timeout).unwrap())
}

pub fn settings(max_failures: u32) -> BroadcastSettings {
    BroadcastSettings {
        poll_interval_ms: POLL_INTERVAL_MS,
        max_consecutive_poll_failures: max_failures,
        ..BroadcastSettings::default()
    }
}

pub fn monitor(primary: &str, fallback: &str) -> BroadcastMonitor {
    BroadcastMonitor::new(client(primary, fallback), settings(3))
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < within {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
