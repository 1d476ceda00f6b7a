//! JSON wire types exchanged with the registration backend.
//!
//! Every response is an envelope carrying a `success` flag. On failure the
//! backend adds an `error` string; on success the remaining fields are the
//! payload, which only the endpoint-specific types below interpret.

use serde::{Deserialize, Serialize};

// ── Generic envelope ──────────────────────────────────────────────────────────

/// `{ success, error?, ...payload }` is the shape of every backend response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

/// Just the flag and error of an envelope; every other field is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Bulk email broadcast ──────────────────────────────────────────────────────

/// Body of the broadcast submission. Omitted `registration_ids` means "all".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSubmit {
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastAccepted {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Server-side lifecycle of a bulk email job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastProgress {
    pub status: JobStatus,
    pub total: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_name: Option<String>,
}

// ── Admin endpoints ───────────────────────────────────────────────────────────

/// A paid registration as listed by the admin endpoint.
/// Fields the client does not use are ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: u64,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub registration_number: String,
    #[serde(default)]
    pub payment_email_sent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaidRegistrations {
    #[serde(default)]
    pub registrations: Vec<Registration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendEmail {
    pub registration_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentVerification {
    #[serde(default)]
    pub payment_status: Option<String>,
}

// ── Public race registration ─────────────────────────────────────────────────
//
// The registration endpoint is a plain REST resource: 201 with the created
// record on success, 400 with per-field errors otherwise. No envelope.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Course {
    #[serde(rename = "KIDS")]
    Kids,
    #[serde(rename = "RUN_5K")]
    Run5k,
    #[serde(rename = "WALK_3K")]
    Walk3k,
}

impl Course {
    pub fn modality(self) -> Modality {
        match self {
            Course::Kids => Modality::Infantil,
            Course::Run5k | Course::Walk3k => Modality::Adulto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Adulto,
    Infantil,
}

/// A new race registration as filled in by the athlete (or their guardian).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    pub email: String,
    pub phone: String,
    /// `YYYY-MM-DD`.
    pub birth_date: String,
    pub gender: String,
    pub course: Course,
    pub shirt_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_cpf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_phone: Option<String>,
    pub athlete_declaration: bool,
}

/// Body of the registration request: the form plus its derived modality.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    #[serde(flatten)]
    pub registration: NewRegistration,
    pub modality: Modality,
}

/// The record the backend created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRegistration {
    pub id: u64,
    pub full_name: String,
    pub email: String,
    pub modality: Modality,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub confirmation_email_sent: bool,
}

/// Validation errors of a rejected registration. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldErrors {
    #[serde(default)]
    pub cpf: Option<Vec<String>>,
    #[serde(default)]
    pub non_field_errors: Option<Vec<String>>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl FieldErrors {
    /// The message worth showing, most specific first.
    pub fn message(&self) -> Option<String> {
        if self.cpf.as_ref().is_some_and(|errs| !errs.is_empty()) {
            return Some("CPF already registered or invalid".to_string());
        }
        if let Some(first) = self.non_field_errors.as_ref().and_then(|errs| errs.first()) {
            return Some(first.clone());
        }
        self.detail.clone()
    }
}

/// Well-known backend paths.
pub mod paths {
    pub const HEALTH: &str = "/api/health/";
    pub const RACE_REGISTRATIONS: &str = "/api/race-registrations/";
    pub const PAID_REGISTRATIONS: &str = "/api/admin/paid-registrations/";
    pub const RESEND_EMAIL: &str = "/api/admin/resend-email/";
    pub const VERIFY_PAYMENT: &str = "/api/payment/verify-status/";
}
