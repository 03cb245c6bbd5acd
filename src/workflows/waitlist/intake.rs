use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::domain::{
    DayOfWeek, EntryId, TimeRange, VipTier, WaitlistEntry, WaitlistPriority, WaitlistStatus,
};
use super::error::WaitlistError;

pub const MAX_NOTES_CHARS: usize = 2000;

fn default_true() -> bool {
    true
}

/// Distinguishes an absent field from an explicit `null` in partial updates.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Signup payload for a new waitlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub patient_id: String,
    pub patient_name: String,
    pub patient_phone: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    pub service_ids: Vec<String>,
    #[serde(default)]
    pub service_names: Vec<String>,
    #[serde(default)]
    pub provider_ids: Vec<String>,
    #[serde(default)]
    pub provider_names: Vec<String>,
    #[serde(default)]
    pub preferred_days: Vec<DayOfWeek>,
    #[serde(default)]
    pub preferred_time_ranges: Vec<TimeRange>,
    #[serde(default)]
    pub flexible_dates: bool,
    #[serde(default = "default_true")]
    pub flexible_providers: bool,
    #[serde(default)]
    pub flexible_times: bool,
    #[serde(default)]
    pub priority: WaitlistPriority,
    #[serde(default)]
    pub tier: VipTier,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deposit: Option<f64>,
    #[serde(default)]
    pub has_completed_forms: bool,
}

impl EntryDraft {
    /// Minimal draft with the defaults a signup form would apply.
    pub fn new(
        patient_id: impl Into<String>,
        patient_name: impl Into<String>,
        patient_phone: impl Into<String>,
        service_ids: Vec<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            patient_name: patient_name.into(),
            patient_phone: patient_phone.into(),
            patient_email: None,
            service_ids,
            service_names: Vec::new(),
            provider_ids: Vec::new(),
            provider_names: Vec::new(),
            preferred_days: Vec::new(),
            preferred_time_ranges: Vec::new(),
            flexible_dates: false,
            flexible_providers: true,
            flexible_times: false,
            priority: WaitlistPriority::Normal,
            tier: VipTier::None,
            notes: None,
            expires_at: None,
            deposit: None,
            has_completed_forms: false,
        }
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> Result<WaitlistEntry, WaitlistError> {
        let patient_id = required("patient_id", &self.patient_id)?;
        let patient_name = required("patient_name", &self.patient_name)?;
        let patient_phone = required("patient_phone", &self.patient_phone)?;
        check_email(self.patient_email.as_deref())?;
        check_services(&self.service_ids)?;
        check_time_ranges(&self.preferred_time_ranges)?;
        check_notes(self.notes.as_deref())?;
        check_deposit(self.deposit)?;

        Ok(WaitlistEntry {
            id: EntryId::generate(),
            patient_id,
            patient_name,
            patient_phone,
            patient_email: self.patient_email,
            service_ids: self.service_ids,
            service_names: self.service_names,
            provider_ids: self.provider_ids,
            provider_names: self.provider_names,
            preferred_days: self.preferred_days,
            preferred_time_ranges: self.preferred_time_ranges,
            flexible_dates: self.flexible_dates,
            flexible_providers: self.flexible_providers,
            flexible_times: self.flexible_times,
            priority: self.priority,
            tier: self.tier,
            status: WaitlistStatus::Active,
            current_offer: None,
            offer_history: Vec::new(),
            notes: self.notes,
            expires_at: self.expires_at,
            deposit: self.deposit,
            has_completed_forms: self.has_completed_forms,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }
}

/// Partial update of an entry's contact details and preferences.
///
/// Lifecycle status is not patchable; it only moves through offers, cancellation, and sweeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub patient_email: Option<Option<String>>,
    #[serde(default)]
    pub service_ids: Option<Vec<String>>,
    #[serde(default)]
    pub service_names: Option<Vec<String>>,
    #[serde(default)]
    pub provider_ids: Option<Vec<String>>,
    #[serde(default)]
    pub provider_names: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_days: Option<Vec<DayOfWeek>>,
    #[serde(default)]
    pub preferred_time_ranges: Option<Vec<TimeRange>>,
    #[serde(default)]
    pub flexible_dates: Option<bool>,
    #[serde(default)]
    pub flexible_providers: Option<bool>,
    #[serde(default)]
    pub flexible_times: Option<bool>,
    #[serde(default)]
    pub priority: Option<WaitlistPriority>,
    #[serde(default)]
    pub tier: Option<VipTier>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub deposit: Option<Option<f64>>,
    #[serde(default)]
    pub has_completed_forms: Option<bool>,
}

impl EntryPatch {
    /// Validate and apply onto `entry`, returning the names of the fields that were set.
    pub fn apply(
        &self,
        entry: &mut WaitlistEntry,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, WaitlistError> {
        self.validate()?;
        let mut touched = Vec::new();

        if let Some(value) = &self.patient_name {
            entry.patient_name = value.trim().to_string();
            touched.push("patient_name");
        }
        if let Some(value) = &self.patient_phone {
            entry.patient_phone = value.trim().to_string();
            touched.push("patient_phone");
        }
        if let Some(value) = &self.patient_email {
            entry.patient_email = value.clone().filter(|email| !email.is_empty());
            touched.push("patient_email");
        }
        if let Some(value) = &self.service_ids {
            entry.service_ids = value.clone();
            touched.push("service_ids");
        }
        if let Some(value) = &self.service_names {
            entry.service_names = value.clone();
            touched.push("service_names");
        }
        if let Some(value) = &self.provider_ids {
            entry.provider_ids = value.clone();
            touched.push("provider_ids");
        }
        if let Some(value) = &self.provider_names {
            entry.provider_names = value.clone();
            touched.push("provider_names");
        }
        if let Some(value) = &self.preferred_days {
            entry.preferred_days = value.clone();
            touched.push("preferred_days");
        }
        if let Some(value) = &self.preferred_time_ranges {
            entry.preferred_time_ranges = value.clone();
            touched.push("preferred_time_ranges");
        }
        if let Some(value) = self.flexible_dates {
            entry.flexible_dates = value;
            touched.push("flexible_dates");
        }
        if let Some(value) = self.flexible_providers {
            entry.flexible_providers = value;
            touched.push("flexible_providers");
        }
        if let Some(value) = self.flexible_times {
            entry.flexible_times = value;
            touched.push("flexible_times");
        }
        if let Some(value) = self.priority {
            entry.priority = value;
            touched.push("priority");
        }
        if let Some(value) = self.tier {
            entry.tier = value;
            touched.push("tier");
        }
        if let Some(value) = &self.notes {
            entry.notes = value.clone().filter(|notes| !notes.is_empty());
            touched.push("notes");
        }
        if let Some(value) = self.expires_at {
            entry.expires_at = value;
            touched.push("expires_at");
        }
        if let Some(value) = self.deposit {
            entry.deposit = value;
            touched.push("deposit");
        }
        if let Some(value) = self.has_completed_forms {
            entry.has_completed_forms = value;
            touched.push("has_completed_forms");
        }

        entry.updated_at = now;
        Ok(touched)
    }

    fn validate(&self) -> Result<(), WaitlistError> {
        if let Some(name) = &self.patient_name {
            required("patient_name", name)?;
        }
        if let Some(phone) = &self.patient_phone {
            required("patient_phone", phone)?;
        }
        if let Some(email) = &self.patient_email {
            check_email(email.as_deref())?;
        }
        if let Some(services) = &self.service_ids {
            check_services(services)?;
        }
        if let Some(ranges) = &self.preferred_time_ranges {
            check_time_ranges(ranges)?;
        }
        if let Some(notes) = &self.notes {
            check_notes(notes.as_deref())?;
        }
        if let Some(deposit) = self.deposit {
            check_deposit(deposit)?;
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<String, WaitlistError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WaitlistError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn check_email(email: Option<&str>) -> Result<(), WaitlistError> {
    match email {
        Some(address) if !address.is_empty() && !address.contains('@') => Err(
            WaitlistError::Validation(format!("patient_email '{address}' is not an email address")),
        ),
        _ => Ok(()),
    }
}

fn check_services(service_ids: &[String]) -> Result<(), WaitlistError> {
    if service_ids.is_empty() {
        return Err(WaitlistError::Validation(
            "service_ids must list at least one service".to_string(),
        ));
    }
    if service_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(WaitlistError::Validation(
            "service_ids must not contain blank ids".to_string(),
        ));
    }
    Ok(())
}

fn check_time_ranges(ranges: &[TimeRange]) -> Result<(), WaitlistError> {
    match ranges.iter().find(|range| range.start >= range.end) {
        Some(range) => Err(WaitlistError::Validation(format!(
            "time range {}-{} must start before it ends",
            range.start, range.end
        ))),
        None => Ok(()),
    }
}

fn check_notes(notes: Option<&str>) -> Result<(), WaitlistError> {
    match notes {
        Some(text) if text.chars().count() > MAX_NOTES_CHARS => Err(WaitlistError::Validation(
            format!("notes must be at most {MAX_NOTES_CHARS} characters"),
        )),
        _ => Ok(()),
    }
}

fn check_deposit(deposit: Option<f64>) -> Result<(), WaitlistError> {
    match deposit {
        Some(amount) if !amount.is_finite() || amount < 0.0 => Err(WaitlistError::Validation(
            "deposit must be a non-negative amount".to_string(),
        )),
        _ => Ok(()),
    }
}
