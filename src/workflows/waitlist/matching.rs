use std::fmt;

use serde::Serialize;

use super::collaborators::AppointmentCalendar;
use super::domain::{DayOfWeek, OpenSlot, WaitlistEntry, WaitlistStatus};

/// First rule an entry failed when matched against a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchRejection {
    ServiceNotRequested,
    ProviderNotPreferred,
    DayNotPreferred { day: DayOfWeek },
    OutsidePreferredTimes,
    NotActive { status: WaitlistStatus },
    ExistingAppointment,
}

impl fmt::Display for MatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceNotRequested => write!(f, "service not requested"),
            Self::ProviderNotPreferred => write!(f, "provider not in preferences"),
            Self::DayNotPreferred { day } => write!(f, "{} not a preferred day", day.label()),
            Self::OutsidePreferredTimes => write!(f, "time outside preferred ranges"),
            Self::NotActive { status } => write!(f, "entry is {status}"),
            Self::ExistingAppointment => write!(f, "patient already booked that day"),
        }
    }
}

/// Preference rules only; no collaborator lookups.
pub fn check_preferences(entry: &WaitlistEntry, slot: &OpenSlot) -> Result<(), MatchRejection> {
    if entry.status != WaitlistStatus::Active {
        return Err(MatchRejection::NotActive {
            status: entry.status,
        });
    }

    if let Some(service_id) = &slot.service_id {
        if !entry.service_ids.contains(service_id) {
            return Err(MatchRejection::ServiceNotRequested);
        }
    }

    if !entry.flexible_providers
        && !entry.provider_ids.is_empty()
        && !entry.provider_ids.contains(&slot.provider_id)
    {
        return Err(MatchRejection::ProviderNotPreferred);
    }

    let day = slot.weekday();
    if !entry.flexible_dates
        && !entry.preferred_days.is_empty()
        && !entry.preferred_days.contains(&day)
    {
        return Err(MatchRejection::DayNotPreferred { day });
    }

    if !entry.flexible_times
        && !entry.preferred_time_ranges.is_empty()
        && !entry
            .preferred_time_ranges
            .iter()
            .any(|range| range.contains(slot.time))
    {
        return Err(MatchRejection::OutsidePreferredTimes);
    }

    Ok(())
}

/// Full eligibility decision given the result of the conflict lookup.
pub fn evaluate(
    entry: &WaitlistEntry,
    slot: &OpenSlot,
    has_conflicting_appointment: bool,
) -> Result<(), MatchRejection> {
    check_preferences(entry, slot)?;
    if has_conflicting_appointment {
        return Err(MatchRejection::ExistingAppointment);
    }
    Ok(())
}

pub fn is_eligible(entry: &WaitlistEntry, slot: &OpenSlot, has_conflicting_appointment: bool) -> bool {
    evaluate(entry, slot, has_conflicting_appointment).is_ok()
}

/// Filters entries down to those a slot can be offered to.
pub struct PreferenceMatcher<'a> {
    calendar: &'a dyn AppointmentCalendar,
}

impl<'a> PreferenceMatcher<'a> {
    pub fn new(calendar: &'a dyn AppointmentCalendar) -> Self {
        Self { calendar }
    }

    pub fn evaluate(&self, entry: &WaitlistEntry, slot: &OpenSlot) -> Result<(), MatchRejection> {
        // preference rules are cheap; only pay for the calendar lookup on survivors
        check_preferences(entry, slot)?;
        let conflict = self.calendar.has_appointment_on(&entry.patient_id, slot.date);
        evaluate(entry, slot, conflict)
    }

    pub fn eligible(&self, entries: Vec<WaitlistEntry>, slot: &OpenSlot) -> Vec<WaitlistEntry> {
        entries
            .into_iter()
            .filter(|entry| match self.evaluate(entry, slot) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::trace!(entry_id = %entry.id, %reason, "entry not eligible for slot");
                    false
                }
            })
            .collect()
    }
}
