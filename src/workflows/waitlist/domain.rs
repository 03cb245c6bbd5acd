use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::error::WaitlistError;

/// Identifier wrapper for waitlist entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn generate() -> Self {
        Self(format!("wl-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for individual offers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(pub String);

impl OfferId {
    pub fn generate() -> Self {
        Self(format!("offer-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::from_weekday(date.weekday())
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

/// Wall-clock time serialized as zero-padded 24-hour `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Strict `HH:MM` parser: two digits each, hour 00-23, minute 00-59.
    pub fn parse(raw: &str) -> Result<Self, WaitlistError> {
        let invalid = || WaitlistError::Validation(format!("invalid time '{raw}', use HH:MM"));
        let bytes = raw.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        let hour = u32::from(digits[0] - b'0') * 10 + u32::from(digits[1] - b'0');
        let minute = u32::from(digits[2] - b'0') * 10 + u32::from(digits[3] - b'0');
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Self::new(hour, minute).ok_or_else(invalid)
    }

    pub fn as_naive(self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for TimeOfDay {
    type Err = WaitlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Strict `YYYY-MM-DD` parser; rejects unpadded fields that chrono would otherwise accept.
pub fn parse_slot_date(raw: &str) -> Result<NaiveDate, WaitlistError> {
    let invalid = || WaitlistError::Validation(format!("invalid date '{raw}', use YYYY-MM-DD"));
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(idx, byte)| idx == 4 || idx == 7 || byte.is_ascii_digit());
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())
}

/// Half-open preferred window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl WaitlistPriority {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VipTier {
    #[default]
    None,
    Silver,
    Gold,
    Platinum,
}

impl VipTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

/// Lifecycle state of a waitlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Active,
    Offered,
    Booked,
    Cancelled,
    Expired,
}

impl WaitlistStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Offered => "offered",
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Booked | Self::Cancelled | Self::Expired)
    }

    pub fn parse(raw: &str) -> Result<Self, WaitlistError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "offered" => Ok(Self::Offered),
            "booked" => Ok(Self::Booked),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(WaitlistError::Validation(format!(
                "unknown waitlist status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// The concrete opening proposed to a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

/// Time-boxed proposal of one slot to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub appointment_slot: AppointmentSlot,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
    pub status: OfferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Offer {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A patient's standing request to be told about an opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: EntryId,
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
    pub flexible_dates: bool,
    pub flexible_providers: bool,
    pub flexible_times: bool,
    pub priority: WaitlistPriority,
    pub tier: VipTier,
    pub status: WaitlistStatus,
    #[serde(default)]
    pub current_offer: Option<Offer>,
    #[serde(default)]
    pub offer_history: Vec<Offer>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deposit: Option<f64>,
    #[serde(default)]
    pub has_completed_forms: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Write counter the repository uses for compare-and-swap.
    #[serde(default)]
    pub revision: u64,
}

impl WaitlistEntry {
    /// `status == offered` exactly when a pending offer is attached.
    pub fn offer_state_consistent(&self) -> bool {
        match (&self.status, &self.current_offer) {
            (WaitlistStatus::Offered, Some(offer)) => offer.status == OfferStatus::Pending,
            (WaitlistStatus::Offered, None) => false,
            (_, Some(_)) => false,
            (_, None) => true,
        }
    }

    pub fn ensure_status(
        &self,
        expected: WaitlistStatus,
        action: &'static str,
    ) -> Result<(), WaitlistError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(WaitlistError::InvalidState {
                action,
                status: self.status,
            })
        }
    }

    /// Attach a pending offer; only legal from `active`.
    pub fn attach_offer(&mut self, offer: Offer, now: DateTime<Utc>) -> Result<(), WaitlistError> {
        self.ensure_status(WaitlistStatus::Active, "send offer to")?;
        self.status = WaitlistStatus::Offered;
        self.current_offer = Some(offer);
        self.updated_at = now;
        Ok(())
    }

    /// Move the pending offer into history with a terminal status.
    ///
    /// Accepted offers book the entry; declined and expired offers return it to the pool.
    pub fn close_offer(&mut self, outcome: OfferStatus, now: DateTime<Utc>) -> Option<Offer> {
        let mut offer = self.current_offer.take()?;
        offer.status = outcome;
        if matches!(outcome, OfferStatus::Accepted | OfferStatus::Declined) {
            offer.responded_at = Some(now);
        }
        self.status = match outcome {
            OfferStatus::Accepted => WaitlistStatus::Booked,
            _ => WaitlistStatus::Active,
        };
        self.offer_history.push(offer.clone());
        self.updated_at = now;
        Some(offer)
    }

    pub fn pending_offer(&self) -> Option<&Offer> {
        self.current_offer
            .as_ref()
            .filter(|offer| offer.status == OfferStatus::Pending)
    }

    /// Whether any requested service overlaps with `service_ids`.
    pub fn requests_any(&self, service_ids: &[String]) -> bool {
        self.service_ids
            .iter()
            .any(|service| service_ids.contains(service))
    }

    /// Whether this entry stops `patient_id` from signing up again for `service_ids`.
    pub fn blocks_signup(&self, patient_id: &str, service_ids: &[String]) -> bool {
        self.patient_id == patient_id
            && matches!(self.status, WaitlistStatus::Active | WaitlistStatus::Offered)
            && self.requests_any(service_ids)
    }
}

fn default_duration() -> u32 {
    30
}

/// Raw slot descriptor as it arrives over the wire, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub date: String,
    pub time: String,
    pub provider_id: String,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u32,
}

impl SlotRequest {
    pub fn validate(&self) -> Result<OpenSlot, WaitlistError> {
        let date = parse_slot_date(self.date.trim())?;
        let time = TimeOfDay::parse(self.time.trim())?;
        let provider_id = self.provider_id.trim();
        if provider_id.is_empty() {
            return Err(WaitlistError::Validation(
                "provider_id must not be empty".to_string(),
            ));
        }
        if self.duration < 5 {
            return Err(WaitlistError::Validation(
                "duration must be at least 5 minutes".to_string(),
            ));
        }

        Ok(OpenSlot {
            date,
            time,
            provider_id: provider_id.to_string(),
            provider_name: self.provider_name.clone(),
            service_id: self
                .service_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            duration_minutes: self.duration,
        })
    }
}

/// A validated opening that the matcher and offer manager operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenSlot {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub provider_id: String,
    pub provider_name: Option<String>,
    pub service_id: Option<String>,
    pub duration_minutes: u32,
}

impl OpenSlot {
    pub fn weekday(&self) -> DayOfWeek {
        DayOfWeek::of(self.date)
    }

    pub fn appointment_slot(&self) -> AppointmentSlot {
        AppointmentSlot {
            date: self.date,
            time: self.time,
            provider_id: self.provider_id.clone(),
            provider_name: self.provider_name.clone(),
        }
    }

    /// Instant the slot starts, reading its wall-clock time in the clinic's offset.
    pub fn starts_at(&self, clinic_offset: FixedOffset) -> DateTime<Utc> {
        let local = self.date.and_time(self.time.as_naive());
        clinic_offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| local.and_utc())
    }
}
