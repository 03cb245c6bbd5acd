use chrono::NaiveDate;
use medspa_waitlist::workflows::waitlist::{
    AppointmentCalendar, NoticeChannel, NotificationError, OfferNotice, OfferNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Booked appointments keyed by patient; stands in for the scheduling system.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAppointmentCalendar {
    bookings: Arc<Mutex<HashMap<String, HashSet<NaiveDate>>>>,
}

impl InMemoryAppointmentCalendar {
    pub(crate) fn book(&self, patient_id: &str, date: NaiveDate) {
        self.bookings
            .lock()
            .expect("calendar mutex poisoned")
            .entry(patient_id.to_string())
            .or_default()
            .insert(date);
    }
}

impl AppointmentCalendar for InMemoryAppointmentCalendar {
    fn has_appointment_on(&self, patient_id: &str, date: NaiveDate) -> bool {
        self.bookings
            .lock()
            .expect("calendar mutex poisoned")
            .get(patient_id)
            .is_some_and(|dates| dates.contains(&date))
    }
}

/// Notifier that logs each notice and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    sent: Arc<Mutex<Vec<OfferNotice>>>,
}

impl LoggingNotifier {
    pub(crate) fn sent(&self) -> Vec<OfferNotice> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl OfferNotifier for LoggingNotifier {
    fn deliver(&self, notice: OfferNotice) -> Result<(), NotificationError> {
        let channels: Vec<&str> = notice
            .channels
            .iter()
            .map(|channel| match channel {
                NoticeChannel::Sms => "sms",
                NoticeChannel::Email => "email",
            })
            .collect();
        info!(
            entry_id = %notice.entry_id,
            offer_id = %notice.offer_id,
            kind = ?notice.kind,
            channels = ?channels,
            "patient notice queued"
        );
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_tracks_bookings_per_patient() {
        let calendar = InMemoryAppointmentCalendar::default();
        let date = NaiveDate::from_ymd_opt(2025, 10, 6).expect("valid date");
        calendar.book("pat-1", date);

        assert!(calendar.has_appointment_on("pat-1", date));
        assert!(!calendar.has_appointment_on("pat-2", date));
        assert!(!calendar.has_appointment_on("pat-1", date.succ_opt().expect("next day")));
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert!(parse_date(" 2025-10-06 ").is_ok());
        let err = parse_date("10/06/2025").expect_err("slashes rejected");
        assert!(err.contains("YYYY-MM-DD"));
    }
}
