use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

/// Person fields sent with an attendance registration.
/// See https://github.com/mobilizeamerica/api#create-organization-event-attendance
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRequestPerson {
    pub given_name: String,
    pub family_name: String,
    pub email_address: String,
    pub postal_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceReceipt {
    /// Timeslots newly registered by this call.
    pub registered_timeslot_ids: Vec<i64>,
    /// Timeslots the person was already signed up for; re-registering is a
    /// safe no-op.
    pub already_registered_timeslot_ids: Vec<i64>,
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The registrar rejected the request; retrying will not help (event
    /// full, timeslot gone, invalid zip).
    #[error("registration rejected ({status}): {detail}")]
    Permanent { status: u16, detail: String },

    /// Upstream outage or rate limit; the caller may retry later.
    #[error("registrar temporarily unavailable ({status})")]
    Transient { status: u16 },

    #[error("registrar unreachable: {0}")]
    Network(String),
}

impl RegistrarError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Network(_))
    }
}

/// External event registrar collaborator. Injected wherever contact
/// recording needs it so tests can substitute a fake.
pub trait EventRegistrar {
    /// Registers the person for the given event timeslots. Idempotent per
    /// (person, event, timeslot): already-registered timeslots are reported
    /// in the receipt rather than re-posted.
    fn register_attendance(
        &self,
        person: &AttendanceRequestPerson,
        event_id: i64,
        timeslot_ids: &[i64],
    ) -> Result<AttendanceReceipt, RegistrarError>;
}

pub struct MobilizeAmericaClient {
    http: reqwest::blocking::Client,
    base_url: String,
    organization_id: i64,
    api_key: Option<String>,
}

impl MobilizeAmericaClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let organization_id = config
            .mobilize_org_id
            .context("MOBILIZE_AMERICA_ORG_ID must be set to use the registrar")?;
        if config.mobilize_api_key.is_none() {
            tracing::warn!("constructing Mobilize America client without an API key");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: config.mobilize_base_url.trim_end_matches('/').to_string(),
            organization_id,
            api_key: config.mobilize_api_key.clone(),
        })
    }

    fn attendances_url(&self, event_id: i64) -> String {
        format!(
            "{}/organizations/{}/events/{}/attendances",
            self.base_url, self.organization_id, event_id
        )
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn check_response(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<serde_json::Value, RegistrarError> {
        let status = response.status();
        let payload: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);

        if status.is_success() {
            return Ok(payload);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(RegistrarError::Transient {
                status: status.as_u16(),
            });
        }
        let detail = payload
            .get("error")
            .map(|error| error.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Err(RegistrarError::Permanent {
            status: status.as_u16(),
            detail,
        })
    }

    /// Timeslots from `timeslot_ids` that the person already attends.
    fn existing_timeslots(
        &self,
        event_id: i64,
        timeslot_ids: &[i64],
        email: &str,
    ) -> Result<Vec<i64>, RegistrarError> {
        let response = self
            .authorize(self.http.get(self.attendances_url(event_id)))
            .send()
            .map_err(|err| RegistrarError::Network(err.to_string()))?;
        let payload = self.check_response(response)?;

        let attendances: AttendanceListing =
            serde_json::from_value(payload).unwrap_or_default();

        let existing = attendances
            .data
            .into_iter()
            .filter(|attendance| attendance.matches_email(email))
            .filter_map(|attendance| attendance.timeslot.map(|slot| slot.id))
            .filter(|slot_id| timeslot_ids.contains(slot_id))
            .collect();
        Ok(existing)
    }
}

impl EventRegistrar for MobilizeAmericaClient {
    fn register_attendance(
        &self,
        person: &AttendanceRequestPerson,
        event_id: i64,
        timeslot_ids: &[i64],
    ) -> Result<AttendanceReceipt, RegistrarError> {
        let already_registered =
            self.existing_timeslots(event_id, timeslot_ids, &person.email_address)?;
        let remaining: Vec<i64> = timeslot_ids
            .iter()
            .copied()
            .filter(|slot_id| !already_registered.contains(slot_id))
            .collect();

        if remaining.is_empty() {
            tracing::debug!(event_id, "all timeslots already registered");
            return Ok(AttendanceReceipt {
                registered_timeslot_ids: Vec::new(),
                already_registered_timeslot_ids: already_registered,
            });
        }

        let payload = serde_json::json!({
            "person": person,
            "timeslots": remaining
                .iter()
                .map(|slot_id| serde_json::json!({ "timeslot_id": slot_id }))
                .collect::<Vec<_>>(),
            "sms_opt_in": "UNSPECIFIED",
            "transactional_sms_opt_in_status": "UNSPECIFIED",
        });

        let response = self
            .authorize(self.http.post(self.attendances_url(event_id)))
            .json(&payload)
            .send()
            .map_err(|err| RegistrarError::Network(err.to_string()))?;
        self.check_response(response)?;

        tracing::info!(
            event_id,
            registered = remaining.len(),
            skipped = already_registered.len(),
            "registered event attendance"
        );
        Ok(AttendanceReceipt {
            registered_timeslot_ids: remaining,
            already_registered_timeslot_ids: already_registered,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct AttendanceListing {
    #[serde(default)]
    data: Vec<AttendanceRecord>,
}

#[derive(Debug, Deserialize)]
struct AttendanceRecord {
    #[serde(default)]
    person: Option<AttendancePerson>,
    #[serde(default)]
    timeslot: Option<AttendanceTimeslot>,
}

impl AttendanceRecord {
    fn matches_email(&self, email: &str) -> bool {
        self.person
            .as_ref()
            .and_then(|person| person.email_addresses.first())
            .map(|entry| entry.address == email)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct AttendancePerson {
    #[serde(default)]
    email_addresses: Vec<AttendanceEmail>,
}

#[derive(Debug, Deserialize)]
struct AttendanceEmail {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct AttendanceTimeslot {
    id: i64,
}
