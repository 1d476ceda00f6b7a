//! Admin API: thin typed wrappers over the generic JSON endpoints.
//!
//! Only the envelope's `success` flag is interpreted here; anything else in
//! the body is the caller's business.

use serde::de::DeserializeOwned;

use mooving_core::wire::{
    paths, Course, CreatedRegistration, FieldErrors, NewRegistration, PaidRegistrations,
    PaymentVerification, Registration, RegistrationRequest, ResendEmail,
};

use crate::endpoint::{EndpointClient, Reply, RequestSpec};
use crate::error::{ApiError, ValidationError};

const CPF_DIGITS: usize = 11;

/// Outcome of a payment verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatus {
    pub paid: bool,
    /// Raw status reported by the backend; empty when it sent none.
    pub status: String,
}

#[derive(Clone)]
pub struct AdminApi {
    client: EndpointClient,
}

impl AdminApi {
    pub fn new(client: EndpointClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &EndpointClient {
        &self.client
    }

    /// Call any endpoint and decode the payload of a successful envelope.
    pub async fn request<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, ApiError> {
        let resp = self.client.call(spec).await?;
        let reply = resp
            .envelope::<T>()
            .map_err(|source| ApiError::Decode {
                status: resp.status().as_u16(),
                source,
            })?;
        match reply {
            Reply::Accepted(payload) => Ok(payload),
            Reply::Rejected(msg) => {
                tracing::debug!(path = spec.path(), error = %msg, "backend rejected request");
                Err(ApiError::Rejected(msg))
            }
        }
    }

    pub async fn paid_registrations(&self) -> Result<Vec<Registration>, ApiError> {
        let list: PaidRegistrations = self
            .request(&RequestSpec::get(paths::PAID_REGISTRATIONS))
            .await?;
        Ok(list.registrations)
    }

    /// Resend the payment confirmation email of one registration.
    pub async fn resend_confirmation(&self, registration_id: u64) -> Result<(), ApiError> {
        let spec = RequestSpec::post(paths::RESEND_EMAIL)
            .json(&ResendEmail { registration_id })
            .map_err(ApiError::Encode)?;
        let _: serde_json::Value = self.request(&spec).await?;
        tracing::info!(registration_id, "confirmation email resent");
        Ok(())
    }

    /// Create a race registration. Input is checked and normalized before
    /// any network call.
    pub async fn register(
        &self,
        registration: &NewRegistration,
    ) -> Result<CreatedRegistration, ApiError> {
        let body = prepare_registration(registration)?;
        let spec = RequestSpec::post(paths::RACE_REGISTRATIONS)
            .json(&body)
            .map_err(ApiError::Encode)?;
        let resp = self.client.call(&spec).await?;
        let status = resp.status();

        if status.is_success() {
            let created: CreatedRegistration =
                resp.json().map_err(|source| ApiError::Decode {
                    status: status.as_u16(),
                    source,
                })?;
            tracing::info!(id = created.id, "race registration created");
            return Ok(created);
        }

        let message = resp
            .json::<FieldErrors>()
            .ok()
            .and_then(|errors| errors.message())
            .unwrap_or_else(|| format!("registration failed (HTTP {})", status.as_u16()));
        tracing::debug!(status = status.as_u16(), error = %message, "registration rejected");
        Err(ApiError::Rejected(message))
    }

    pub async fn verify_payment(&self, session_id: &str) -> Result<PaymentStatus, ApiError> {
        let spec = RequestSpec::get(paths::VERIFY_PAYMENT).query("session_id", session_id);
        let verification: PaymentVerification = self.request(&spec).await?;
        let status = verification.payment_status.unwrap_or_default();
        Ok(PaymentStatus {
            paid: status == "paid",
            status,
        })
    }
}

fn digits(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_digit)
        .take(CPF_DIGITS)
        .collect()
}

/// Normalize a registration the way the sign-up form does: CPFs keep only
/// their digits, a guardian's CPF is sent for kids only, and kids' contact
/// details fall back to the guardian's.
fn prepare_registration(
    registration: &NewRegistration,
) -> Result<RegistrationRequest, ValidationError> {
    if !registration.athlete_declaration {
        return Err(ValidationError::MissingDeclaration);
    }
    let kids = registration.course == Course::Kids;
    let mut prepared = registration.clone();

    prepared.cpf = registration
        .cpf
        .as_deref()
        .map(digits)
        .filter(|cpf| !cpf.is_empty());
    if !kids && prepared.cpf.as_ref().map_or(0, String::len) != CPF_DIGITS {
        return Err(ValidationError::InvalidCpf);
    }

    if kids {
        prepared.responsible_cpf = registration
            .responsible_cpf
            .as_deref()
            .map(digits)
            .filter(|cpf| !cpf.is_empty());
        if let Some(email) = registration.responsible_email.as_ref().filter(|e| !e.is_empty()) {
            prepared.email = email.clone();
        }
        if let Some(phone) = registration.responsible_phone.as_ref().filter(|p| !p.is_empty()) {
            prepared.phone = phone.clone();
        }
    } else {
        prepared.responsible_cpf = None;
    }

    Ok(RegistrationRequest {
        modality: registration.course.modality(),
        registration: prepared,
    })
}
