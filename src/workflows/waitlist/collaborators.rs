//! Outbound boundaries of the waitlist engine: appointment lookups, patient notifications,
//! audit logging, and the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AppointmentSlot, EntryId, OfferId};

/// Read-only view of the appointment book.
pub trait AppointmentCalendar: Send + Sync {
    /// Whether the patient already holds a live appointment on `date`.
    fn has_appointment_on(&self, patient_id: &str, date: NaiveDate) -> bool;
}

/// Outbound patient messaging hook (SMS, e-mail, push).
pub trait OfferNotifier: Send + Sync {
    fn deliver(&self, notice: OfferNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    OfferIssued,
    OfferAccepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeChannel {
    Sms,
    Email,
}

/// Payload handed to the notifier; carries the bearer token so the message can link back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferNotice {
    pub kind: NoticeKind,
    pub entry_id: EntryId,
    pub offer_id: OfferId,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: Option<String>,
    pub slot: AppointmentSlot,
    pub expires_at: DateTime<Utc>,
    pub token: Option<String>,
    pub channels: Vec<NoticeChannel>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// Append-only compliance record of a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub patient_id: Option<String>,
    pub phi_accessed: bool,
    pub metadata: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        resource_type: &'static str,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            resource_type,
            resource_id: resource_id.into(),
            patient_id: None,
            phi_accessed: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Mark the event as touching a patient's record.
    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self.phi_accessed = true;
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Default sink: structured log lines under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            action = ?event.action,
            resource_type = event.resource_type,
            resource_id = %event.resource_id,
            patient_id = event.patient_id.as_deref().unwrap_or("-"),
            phi_accessed = event.phi_accessed,
            metadata = ?event.metadata,
            "waitlist audit event"
        );
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
