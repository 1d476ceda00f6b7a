//! Broadcast job monitor: starts a bulk email job on the backend and
//! follows its progress by polling, without a persistent connection.
//!
//! ```text
//!   Idle ──submit──► Submitting ──task id──► Polling ──status=done──► Done
//!     ▲                  │                     │  ▲
//!     │                  │ error               │  └─ status != done
//!     └──── cancel ──────┴─────────────────────┤
//!                                              └─ too many failed polls ──► Failed
//! ```
//!
//! Validation and submission failures also land in `Failed`. Cancelling only
//! stops local observation; the job keeps running on the server.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use mooving_core::config::BroadcastSettings;
use mooving_core::wire::{BroadcastAccepted, BroadcastProgress, BroadcastSubmit, JobStatus};

use crate::endpoint::{EndpointClient, Reply, RequestSpec};
use crate::error::{BroadcastError, PollError, SubmissionError, ValidationError};

// ── Types ─────────────────────────────────────────────────────────────────────

/// Opaque job handle issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Who receives the broadcast. Chosen once per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// Every registration the backend knows about.
    AllRecipients,
    /// Explicit registration ids, in order. Must not be empty.
    Recipients(Vec<u64>),
}

/// Immutable progress snapshot handed to progress callbacks.
///
/// `sent_count + failed_count <= total` holds for every snapshot; responses
/// violating it are treated as failed polls and never delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastJob {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    /// Recipient the backend is currently sending to, if it reported one.
    pub current_recipient: Option<String>,
}

impl BroadcastJob {
    fn from_progress(job_id: JobId, progress: BroadcastProgress) -> Result<Self, PollError> {
        let within_total = progress
            .sent_count
            .checked_add(progress.failed_count)
            .is_some_and(|processed| processed <= progress.total);
        if !within_total {
            return Err(PollError::Inconsistent {
                total: progress.total,
                sent: progress.sent_count,
                failed: progress.failed_count,
            });
        }
        Ok(Self {
            job_id,
            status: progress.status,
            total: progress.total,
            sent_count: progress.sent_count,
            failed_count: progress.failed_count,
            current_recipient: progress.current_name.filter(|name| !name.is_empty()),
        })
    }

    pub fn processed(&self) -> u64 {
        self.sent_count.saturating_add(self.failed_count)
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed())
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Submitting,
    Polling,
    Done,
    Failed,
}

impl MonitorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MonitorState::Done | MonitorState::Failed)
    }

    fn is_in_flight(self) -> bool {
        matches!(self, MonitorState::Submitting | MonitorState::Polling)
    }
}

type ProgressFn = Arc<dyn Fn(&BroadcastJob) + Send + Sync>;

// ── Shared state ──────────────────────────────────────────────────────────────

/// Observation bookkeeping. Cancellation and snapshot delivery both take this
/// lock, so a snapshot is either delivered before `cancel()` or never.
#[derive(Default)]
struct Observation {
    /// Bumped by every submit and cancel; a poll task delivers only while it matches.
    generation: u64,
    active: bool,
    last: Option<BroadcastJob>,
    /// How the current job's observation ended; taken by the first `wait()`.
    outcome: Option<Result<BroadcastJob, BroadcastError>>,
    progress: Option<ProgressFn>,
    token: Option<CancellationToken>,
}

struct Shared {
    client: EndpointClient,
    settings: BroadcastSettings,
    state: watch::Sender<MonitorState>,
    observation: Mutex<Observation>,
}

/// The repeating status timer of one job. Only `cancel()`, the next
/// `submit()`, or dropping the monitor release it.
struct PollHandle {
    job_id: JobId,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
        self.task.abort();
    }
}

/// Puts the monitor back to `Idle` if a `submit()` future is dropped mid-request.
struct SubmitGuard<'a> {
    state: &'a watch::Sender<MonitorState>,
    armed: bool,
}

impl SubmitGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_if_modified(|state| {
                let abandoned = *state == MonitorState::Submitting;
                if abandoned {
                    *state = MonitorState::Idle;
                }
                abandoned
            });
        }
    }
}

// ── Monitor ───────────────────────────────────────────────────────────────────

/// Drives one bulk email job at a time from submission to completion.
pub struct BroadcastMonitor {
    shared: Arc<Shared>,
    poll: Mutex<Option<PollHandle>>,
}

impl BroadcastMonitor {
    pub fn new(client: EndpointClient, settings: BroadcastSettings) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        Self {
            shared: Arc::new(Shared {
                client,
                settings,
                state,
                observation: Mutex::new(Observation::default()),
            }),
            poll: Mutex::new(None),
        }
    }

    /// Register the progress callback, replacing any previous one.
    ///
    /// Called on the polling task with every snapshot, the final `done` one
    /// included, in the order the status responses arrived.
    pub async fn on_progress<F>(&self, callback: F)
    where
        F: Fn(&BroadcastJob) + Send + Sync + 'static,
    {
        self.shared.observation.lock().await.progress = Some(Arc::new(callback));
    }

    pub fn state(&self) -> MonitorState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.shared.state.subscribe()
    }

    /// Last snapshot delivered for the current or most recent job.
    pub async fn last_snapshot(&self) -> Option<BroadcastJob> {
        self.shared.observation.lock().await.last.clone()
    }

    /// Validate, submit, and start polling. Returns the backend's job handle.
    ///
    /// Input is validated before any network call. While a job is being
    /// submitted or polled, further submissions fail with [`BroadcastError::Busy`].
    pub async fn submit(
        &self,
        target: BroadcastTarget,
        subject: &str,
        message: &str,
    ) -> Result<JobId, BroadcastError> {
        let mut obs = self.shared.observation.lock().await;
        let validated = validate(target, subject, message);
        if self.state().is_in_flight() {
            // The running job is left alone either way.
            return Err(match validated {
                Err(e) => e.into(),
                Ok(_) => BroadcastError::Busy,
            });
        }
        let body = match validated {
            Ok(body) => body,
            Err(e) => {
                obs.active = false;
                obs.outcome = None;
                self.shared.state.send_replace(MonitorState::Failed);
                tracing::warn!(error = %e, "broadcast rejected before submission");
                return Err(e.into());
            }
        };
        obs.generation += 1;
        obs.active = true;
        obs.last = None;
        obs.outcome = None;
        let generation = obs.generation;
        let token = CancellationToken::new();
        obs.token = Some(token.clone());
        self.shared.state.send_replace(MonitorState::Submitting);
        drop(obs);

        // Release the finished timer of an earlier job, if any.
        self.poll.lock().await.take();

        let guard = SubmitGuard {
            state: &self.shared.state,
            armed: true,
        };
        let outcome = self.shared.request_job(&body).await;

        let mut obs = self.shared.observation.lock().await;
        guard.disarm();
        if obs.generation != generation {
            let job_id = outcome.ok();
            tracing::info!(job_id = ?job_id, "broadcast cancelled during submission");
            return Err(BroadcastError::Cancelled { job_id });
        }

        match outcome {
            Err(e) => {
                obs.active = false;
                obs.token = None;
                self.shared.state.send_replace(MonitorState::Failed);
                tracing::warn!(error = %e, "broadcast submission failed");
                Err(e.into())
            }
            Ok(job_id) => {
                tracing::info!(%job_id, "broadcast job accepted, polling for progress");
                self.shared.state.send_replace(MonitorState::Polling);
                let task = tokio::spawn(poll_job(
                    self.shared.clone(),
                    job_id.clone(),
                    generation,
                    token.clone(),
                ));
                *self.poll.lock().await = Some(PollHandle {
                    job_id: job_id.clone(),
                    token,
                    task,
                });
                Ok(job_id)
            }
        }
    }

    /// Stop observing the current job. Returns false if nothing was in flight.
    ///
    /// No progress callback fires for the job afterwards, even for a status
    /// response that was already on its way. The server-side job is untouched.
    pub async fn cancel(&self) -> bool {
        let mut obs = self.shared.observation.lock().await;
        if !self.state().is_in_flight() {
            return false;
        }
        obs.generation += 1;
        obs.active = false;
        if let Some(token) = obs.token.take() {
            token.cancel();
        }
        self.shared.state.send_replace(MonitorState::Idle);
        let handle = self.poll.lock().await.take();
        drop(obs);

        if let Some(handle) = handle {
            tracing::info!(job_id = %handle.job_id, "stopped observing broadcast job");
        }
        true
    }

    /// Wait for observation of the current job to end.
    ///
    /// Yields the final snapshot once the job is done, or the error that ended
    /// observation. Fails with [`BroadcastError::NotStarted`] when no job is
    /// being polled (never submitted, cancelled, or already awaited).
    ///
    /// Dropping the returned future has no effect on polling.
    pub async fn wait(&self) -> Result<BroadcastJob, BroadcastError> {
        // Subscribe before looking, so no transition can slip in between.
        let mut states = self.shared.state.subscribe();
        let (generation, job_id) = {
            let mut obs = self.shared.observation.lock().await;
            if let Some(outcome) = obs.outcome.take() {
                return outcome;
            }
            if !obs.active || self.state() != MonitorState::Polling {
                return Err(BroadcastError::NotStarted);
            }
            let job_id = self.poll.lock().await.as_ref().map(|h| h.job_id.clone());
            (obs.generation, job_id)
        };

        loop {
            if states.changed().await.is_err() {
                return Err(BroadcastError::Cancelled { job_id });
            }
            let mut obs = self.shared.observation.lock().await;
            if obs.generation != generation {
                return Err(BroadcastError::Cancelled { job_id });
            }
            if let Some(outcome) = obs.outcome.take() {
                return outcome;
            }
            if !obs.active {
                // Another waiter already took the outcome.
                return Err(BroadcastError::NotStarted);
            }
        }
    }
}

impl Shared {
    async fn request_job(&self, body: &BroadcastSubmit) -> Result<JobId, SubmissionError> {
        let spec = RequestSpec::post(&self.settings.submit_path)
            .json(body)
            .map_err(SubmissionError::Encode)?;
        let resp = self.client.call(&spec).await?;
        let reply = resp
            .envelope::<BroadcastAccepted>()
            .map_err(|source| SubmissionError::Decode {
                status: resp.status().as_u16(),
                source,
            })?;
        match reply {
            Reply::Rejected(msg) => Err(SubmissionError::Rejected(msg)),
            Reply::Accepted(BroadcastAccepted {
                task_id: Some(id),
            }) if !id.is_empty() => Ok(JobId(id)),
            Reply::Accepted(_) => Err(SubmissionError::MissingJobId),
        }
    }

    async fn query_status(
        &self,
        spec: &RequestSpec,
        job_id: &JobId,
    ) -> Result<BroadcastJob, PollError> {
        let resp = self.client.call(spec).await?;
        let reply = resp
            .envelope::<BroadcastProgress>()
            .map_err(|source| PollError::Decode {
                status: resp.status().as_u16(),
                source,
            })?;
        match reply {
            Reply::Rejected(msg) => Err(PollError::Rejected(msg)),
            Reply::Accepted(progress) => BroadcastJob::from_progress(job_id.clone(), progress),
        }
    }

    /// Record and hand out a snapshot. False once the job is no longer observed.
    async fn deliver(&self, generation: u64, job: &BroadcastJob) -> bool {
        let mut obs = self.observation.lock().await;
        if obs.generation != generation || !obs.active {
            tracing::debug!(job_id = %job.job_id, "discarding snapshot of unobserved job");
            return false;
        }
        obs.last = Some(job.clone());
        if job.is_done() {
            obs.active = false;
            obs.token = None;
            obs.outcome = Some(Ok(job.clone()));
            self.state.send_replace(MonitorState::Done);
            if job.processed() != job.total {
                tracing::warn!(
                    job_id = %job.job_id,
                    total = job.total,
                    processed = job.processed(),
                    "job reported done with unaccounted recipients"
                );
            }
            tracing::info!(
                job_id = %job.job_id,
                total = job.total,
                sent = job.sent_count,
                failed = job.failed_count,
                "broadcast job finished"
            );
        }
        if let Some(progress) = &obs.progress {
            progress(job);
        }
        true
    }

    async fn fail(&self, generation: u64, error: BroadcastError) {
        let mut obs = self.observation.lock().await;
        if obs.generation == generation && obs.active {
            obs.active = false;
            obs.token = None;
            obs.outcome = Some(Err(error));
            self.state.send_replace(MonitorState::Failed);
        }
    }
}

fn validate(
    target: BroadcastTarget,
    subject: &str,
    message: &str,
) -> Result<BroadcastSubmit, ValidationError> {
    if subject.trim().is_empty() {
        return Err(ValidationError::EmptySubject);
    }
    if message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let registration_ids = match target {
        BroadcastTarget::AllRecipients => None,
        BroadcastTarget::Recipients(ids) if ids.is_empty() => {
            return Err(ValidationError::NoRecipients)
        }
        BroadcastTarget::Recipients(ids) => Some(ids),
    };
    Ok(BroadcastSubmit {
        subject: subject.to_string(),
        message: message.to_string(),
        registration_ids,
    })
}

/// Poll one job until it is done, observation is cancelled, or too many
/// consecutive status queries fail. At most one query is in flight; ticks
/// that fall due while it is outstanding are skipped. The outcome is
/// recorded on `shared` for `wait()`.
async fn poll_job(shared: Arc<Shared>, job_id: JobId, generation: u64, token: CancellationToken) {
    let period = Duration::from_millis(shared.settings.poll_interval_ms.max(1));
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let spec = RequestSpec::get(shared.settings.status_path_for(job_id.as_str()));
    let max_failures = shared.settings.max_consecutive_poll_failures;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = timer.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            polled = shared.query_status(&spec, &job_id) => polled,
        };

        match polled {
            Ok(job) => {
                failures = 0;
                if !shared.deliver(generation, &job).await {
                    break;
                }
                if job.is_done() {
                    return;
                }
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(%job_id, failures, error = %err, "status query failed");
                if max_failures > 0 && failures >= max_failures {
                    let error = BroadcastError::Poll {
                        failures,
                        last: err,
                    };
                    shared.fail(generation, error).await;
                    return;
                }
            }
        }
    }

    tracing::debug!(%job_id, "polling stopped");
}
